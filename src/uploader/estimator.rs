//! 速度与剩余时间估算
//!
//! 纯函数，不持有状态。字节单位按 1024 进位：B, KB, MB, GB, TB；
//! 小于 10 个单位时保留一位小数，否则取整。

use std::time::Instant;

/// 尚无法估算剩余时间
pub const CALCULATING: &str = "calculating";

/// 零速度
pub const ZERO_RATE: &str = "0 B/s";

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 格式化字节数
///
/// `0 → "0 B"`，`1536 → "1.5 KB"`，`15360 → "15 KB"`
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // 先按显示精度取整，再判断是否需要进位
    loop {
        let tenths = (value * 10.0).round();
        if tenths < 100.0 {
            return format!("{:.1} {}", tenths / 10.0, UNITS[unit]);
        }
        let whole = value.round();
        if whole >= 1024.0 && unit < UNITS.len() - 1 {
            value = whole / 1024.0;
            unit += 1;
            continue;
        }
        return format!("{:.0} {}", whole, UNITS[unit]);
    }
}

/// 格式化速度（字节/秒）
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return ZERO_RATE.to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec.round() as u64))
}

/// 格式化剩余秒数：`Ns`（< 60s）、`Nm`（< 1h）、`Nh`
///
/// 四舍五入到最近的整数单位，剩余量大于 0 时至少为 `1s`
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0s".to_string();
    }

    let whole = secs.round().max(1.0) as u64;
    if whole < 60 {
        return format!("{}s", whole);
    }

    // 取整后满 60 分钟按小时显示
    let minutes = (whole as f64 / 60.0).round() as u64;
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h", (whole as f64 / 3600.0).round().max(1.0) as u64)
    }
}

/// 根据已传输字节和耗时估算速度
///
/// 耗时为 0 时返回 `"0 B/s"`
pub fn estimate_rate(bytes_transferred: u64, started_at: Instant, now: Instant) -> String {
    let elapsed = now.saturating_duration_since(started_at);
    if elapsed.is_zero() {
        return ZERO_RATE.to_string();
    }
    format_speed(bytes_transferred as f64 / elapsed.as_secs_f64())
}

/// 按当前平均速度线性估算剩余时间
///
/// 耗时为 0 或尚未传输任何字节时返回 `"calculating"`
pub fn estimate_time_remaining(
    bytes_transferred: u64,
    total_bytes: u64,
    started_at: Instant,
    now: Instant,
) -> String {
    let elapsed = now.saturating_duration_since(started_at);
    if elapsed.is_zero() || bytes_transferred == 0 {
        return CALCULATING.to_string();
    }

    let remaining = total_bytes.saturating_sub(bytes_transferred);
    if remaining == 0 {
        return "0s".to_string();
    }

    let rate = bytes_transferred as f64 / elapsed.as_secs_f64();
    format_duration(remaining as f64 / rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_format_bytes_table() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(15 * 1024), "15 KB");
        assert_eq!(format_bytes(MB), "1.0 MB");
        assert_eq!(format_bytes(250 * MB), "250 MB");
        assert_eq!(format_bytes(3 * 1024 * MB), "3.0 GB");
        assert_eq!(format_bytes(2048 * 1024 * 1024 * MB), "2048 TB");
    }

    #[test]
    fn test_format_bytes_rounds_before_promoting() {
        // 9.999 KB 显示为 10 KB，而非 10.0 KB
        assert_eq!(format_bytes(10 * 1024 - 1), "10 KB");
        // 1023.999 KB 进位到 MB
        assert_eq!(format_bytes(MB - 1), "1.0 MB");
        assert_eq!(format_bytes(1024 * MB - 1), "1.0 GB");
        assert_eq!(format_speed((MB - 1) as f64), "1.0 MB/s");
    }

    #[test]
    fn test_rate() {
        let start = Instant::now();
        assert_eq!(estimate_rate(MB, start, start), "0 B/s");
        assert_eq!(estimate_rate(MB, start, start + Duration::from_secs(1)), "1.0 MB/s");
        assert_eq!(estimate_rate(5 * MB, start, start + Duration::from_secs(5)), "1.0 MB/s");
        assert_eq!(estimate_rate(0, start, start + Duration::from_secs(5)), "0 B/s");
        assert_eq!(estimate_rate(3000, start, start + Duration::from_secs(2)), "1.5 KB/s");
    }

    #[test]
    fn test_time_remaining() {
        let start = Instant::now();
        let at = |secs| start + Duration::from_secs(secs);

        assert_eq!(estimate_time_remaining(MB, 10 * MB, start, start), "calculating");
        assert_eq!(estimate_time_remaining(0, 10 * MB, start, at(3)), "calculating");
        assert_eq!(estimate_time_remaining(5 * MB, 10 * MB, start, at(5)), "5s");
        assert_eq!(estimate_time_remaining(MB, 10 * MB, start, at(1)), "9s");
        assert_eq!(estimate_time_remaining(MB, 121 * MB, start, at(1)), "2m");
        assert_eq!(estimate_time_remaining(MB, 7201 * MB, start, at(1)), "2h");
        assert_eq!(estimate_time_remaining(10 * MB, 10 * MB, start, at(10)), "0s");
    }

    #[test]
    fn test_near_completion_never_zero() {
        let start = Instant::now();
        // 剩余 1 字节，速度 1 MB/s
        assert_eq!(
            estimate_time_remaining(MB - 1, MB, start, start + Duration::from_secs(1)),
            "1s"
        );
    }

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(0.2), "1s");
        assert_eq!(format_duration(59.4), "59s");
        assert_eq!(format_duration(90.0), "2m");
        assert_eq!(format_duration(59.6), "1m");
        assert_eq!(format_duration(3569.0), "59m");
        assert_eq!(format_duration(3599.0), "1h");
        assert_eq!(format_duration(5400.0), "2h");
        assert_eq!(format_duration(f64::INFINITY), "0s");
    }

    proptest! {
        #[test]
        fn prop_in_progress_eta_is_never_zero(
            transferred in 1u64..1_000_000_000,
            extra in 1u64..1_000_000_000,
            elapsed_ms in 1u64..10_000_000,
        ) {
            let start = Instant::now();
            let eta = estimate_time_remaining(
                transferred,
                transferred + extra,
                start,
                start + Duration::from_millis(elapsed_ms),
            );
            prop_assert_ne!(eta, "0s");
        }

        #[test]
        fn prop_format_bytes_has_unit(bytes in any::<u64>()) {
            let text = format_bytes(bytes);
            let has_unit = UNITS.iter().any(|u| text.ends_with(&format!(" {}", u)));
            prop_assert!(has_unit, "缺少单位: {}", text);
        }
    }
}
