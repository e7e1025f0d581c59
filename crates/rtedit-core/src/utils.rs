//! 通用工具函数

use chrono::NaiveDate;

/// 解析DICOM日期 (YYYYMMDD)
pub fn parse_study_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// 格式化检查日期为 DD/MM/YYYY，无法解析时返回 N/A
pub fn format_study_date(raw: Option<&str>) -> String {
    raw.and_then(parse_study_date)
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// 计算百分比进度
pub fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_study_date() {
        assert_eq!(format_study_date(Some("20240131")), "31/01/2024");
        assert_eq!(format_study_date(Some("N/A")), "N/A");
        assert_eq!(format_study_date(Some("2024013")), "N/A");
        assert_eq!(format_study_date(None), "N/A");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0.0);
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(4, 4), 100.0);
        assert_eq!(percent(0, 0), 100.0);
    }
}
