// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Jittered exponential backoff for reconnection attempts.

use rand::Rng;

/// `min(base * 2^attempt, cap)`, before jitter. Kept separate from
/// [`jittered_delay_ms`] so tests can assert the unperturbed curve.
pub fn exponential_delay_ms(base_ms: u64, attempt: u32, cap_ms: u64) -> u64 {
    base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX).max(1)).min(cap_ms)
}

/// `exponential_delay_ms` perturbed by +/-10% jitter, to avoid a thundering
/// herd of reconnecting clients all retrying in lockstep.
pub fn jittered_delay_ms(base_ms: u64, attempt: u32, cap_ms: u64) -> u64 {
    let base = exponential_delay_ms(base_ms, attempt, cap_ms);
    jitter(base)
}

fn jitter(base: u64) -> u64 {
    if base == 0 {
        return 0;
    }
    let factor = rand::rng().random_range(0.9..=1.1);
    ((base as f64) * factor).round() as u64
}
