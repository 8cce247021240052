// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

// Criterion settings shared by every bench target, tunable through `FLOWFORM_BENCH_*`.

use std::str::FromStr;
use std::time::Duration;

use criterion::Criterion;

use pprof::criterion::{Output, PProfProfiler};

fn knob<T: FromStr + Ord>(suffix: &str, default: T, min: T, max: T) -> T {
    std::env::var(format!("FLOWFORM_BENCH_{suffix}"))
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

/// Criterion with a flamegraph profiler attached (written under `target/criterion/**/profile`
/// when run with `--profile-time`).
pub fn criterion() -> Criterion {
    let frequency: i32 = knob("PROFILE_FREQ", 100, 1, 1000);
    let samples: usize = knob("SAMPLES", 40, 10, 200);
    let warmup = Duration::from_secs(knob("WARMUP_SECS", 2, 1, 60));
    let measurement = Duration::from_secs(knob("MEASURE_SECS", 5, 1, 120));

    Criterion::default()
        .sample_size(samples)
        .warm_up_time(warmup)
        .measurement_time(measurement)
        .with_profiler(PProfProfiler::new(frequency, Output::Flamegraph(None)))
}
