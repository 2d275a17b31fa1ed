// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Utility functions used by the stream pipeline for sizing and log formatting.
use std::time::Duration;

const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Number of bytes a `u64` occupies when encoded as a LEB128 varint.
pub fn varint_len(v: u64) -> usize {
    // 7 payload bits per byte, at least one byte.
    let bits = 64 - (v | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Size of a length-delimited field: one tag byte, the varint length, then the payload.
pub fn delimited_len(payload: usize) -> usize {
    1 + varint_len(payload as u64) + payload
}

/// Formats a byte count with SI units, e.g. `"83 MB"` or `"1.2 kB"`.
///
/// Values below 10 in the chosen unit keep one decimal digit.
pub fn human_bytes(n: u64) -> String {
    if n < 10 {
        return format!("{} B", n);
    }

    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", n)
    } else if value < 10.0 {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}

/// Formats a duration as fixed width `01h02m03s`, or `02m03s` when under an hour.
pub fn fixed_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);

    if h > 0 {
        format!("{:02}h{:02}m{:02}s", h, m, s)
    } else {
        format!("{:02}m{:02}s", m, s)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(1), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(16_383), 2);
        assert_eq!(varint_len(16_384), 3);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    #[test]
    fn test_delimited_len() {
        assert_eq!(delimited_len(0), 2);
        assert_eq!(delimited_len(3), 5);
        assert_eq!(delimited_len(200), 203);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(9), "9 B");
        assert_eq!(human_bytes(999), "999 B");
        assert_eq!(human_bytes(1_200), "1.2 kB");
        assert_eq!(human_bytes(83_000_000), "83 MB");
        assert_eq!(human_bytes(4 << 20), "4.2 MB");
    }

    #[test]
    fn test_fixed_duration() {
        assert_eq!(fixed_duration(Duration::from_secs(0)), "00m00s");
        assert_eq!(fixed_duration(Duration::from_secs(75)), "01m15s");
        assert_eq!(fixed_duration(Duration::from_secs(3600 + 2 * 60 + 3)), "01h02m03s");
        assert_eq!(fixed_duration(Duration::from_millis(1999)), "00m01s");
    }
}
