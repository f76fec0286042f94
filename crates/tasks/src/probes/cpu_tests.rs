// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz
cpu MHz\t\t: 2600.000
cpu cores\t: 6

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Core(TM) i7-9750H CPU @ 2.60GHz
cpu MHz\t\t: 2600.000
cpu cores\t: 6
";

#[test]
fn test_parse_cpuinfo() {
    let info = parse_cpuinfo(CPUINFO);
    assert_eq!(info.threads, 2);
    assert_eq!(info.cores, Some(6));
    assert_eq!(info.mhz, Some(2600));
    assert_eq!(info.vendor.as_deref(), Some("GenuineIntel"));
    assert!(info.model.unwrap().starts_with("Intel(R) Core(TM)"));
}

#[test]
fn test_parse_cpuinfo_empty() {
    let info = parse_cpuinfo("");
    assert_eq!(info.threads, 0);
    assert_eq!(info.model, None);
}
