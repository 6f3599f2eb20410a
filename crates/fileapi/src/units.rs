//! Byte-count conversions and file-name helpers.

use crate::error::{FileApiError, Result};

/// Unit prefixes in ascending order of 1024 multiples.
const SCALE: [&str; 6] = ["", "K", "M", "G", "T", "P"];

/// Limit used when a configured upload limit is left empty.
pub const UNLIMITED_SIZE: &str = "9P";

/// Parse a human size such as `10MB` or `1 T` into bytes.
///
/// Only the first letter of the unit counts and units are binary
/// (`1K == 1024`). Unknown unit letters leave the number unscaled.
pub fn size_to_num(value: &str) -> Result<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    if number.is_empty() {
        return Err(FileApiError::InvalidSize(value.to_string()));
    }

    let multiplier = match unit.trim_start().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('P') => 1u64 << 50,
        Some('T') => 1u64 << 40,
        Some('G') => 1u64 << 30,
        Some('M') => 1u64 << 20,
        Some('K') => 1u64 << 10,
        _ => 1,
    };

    if number.contains('.') {
        let parsed: f64 = number
            .parse()
            .map_err(|_| FileApiError::InvalidSize(value.to_string()))?;
        return Ok((parsed * multiplier as f64) as u64);
    }

    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| FileApiError::InvalidSize(value.to_string()))
}

/// Reduce a byte count to its largest unit, rounding at each step.
pub fn num_to_size_parts(num: u64) -> (u64, &'static str) {
    let mut num = num;
    let mut n = 0;
    while num >= 1024 && n < SCALE.len() - 1 {
        num = (num as f64 / 1024.0).round() as u64;
        n += 1;
    }
    (num, SCALE[n])
}

/// Format a byte count as `"<n> <unit>B"`.
pub fn num_to_size(num: u64) -> String {
    let (num, unit) = num_to_size_parts(num);
    format!("{} {}B", num, unit)
}

/// Lowercase extension after the last dot.
///
/// Names without a dot, or whose only dot is the first character, have no
/// extension.
pub fn extension(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[dot + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Font Awesome icon class for an extension.
pub fn icon(ext: &str) -> &'static str {
    match ext {
        "pdf" => "fa-file-pdf",
        "xml" | "html" | "txt" => "fa-file-text",
        "svg" | "gif" | "bmp" | "png" | "jpeg" | "jpg" => "fa-file-image",
        "doc" | "docx" | "odt" => "fa-file-word",
        "ods" | "xls" | "xlsx" | "csv" => "fa-file-excel",
        "7z" | "gz" | "gzip" | "rar" | "tar" | "zip" => "fa-file-zipper",
        "aac" | "m4a" | "mp3" | "flac" | "opus" | "wav" => "fa-file-audio",
        "avi" | "mp4" | "mkv" => "fa-file-video",
        "js" | "css" | "php" => "fa-file-code",
        _ => "fa-file",
    }
}

/// Effective upload limit.
///
/// The smaller of the per-file and per-request limits, further reduced to
/// `custom` when that is non-zero and smaller.
pub fn max_upload(custom: u64, file_limit: &str, post_limit: &str) -> Result<u64> {
    let or_unlimited = |s: &str| if s.trim().is_empty() { UNLIMITED_SIZE.to_string() } else { s.to_string() };
    let max = size_to_num(&or_unlimited(file_limit))?.min(size_to_num(&or_unlimited(post_limit))?);
    if custom != 0 && max > custom {
        Ok(custom)
    } else {
        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_to_num() {
        assert_eq!(size_to_num("1KB").unwrap(), 1024);
        assert_eq!(size_to_num("10MB").unwrap(), 10_485_760);
        assert_eq!(size_to_num("100GB").unwrap(), 107_374_182_400);
        assert_eq!(size_to_num("1 T").unwrap(), 1_099_511_627_776);
        assert_eq!(size_to_num("2m").unwrap(), 2 * 1024 * 1024);
        assert_eq!(size_to_num("512").unwrap(), 512);
        assert_eq!(size_to_num("1.5K").unwrap(), 1536);
    }

    #[test]
    fn test_size_to_num_unknown_unit_is_bytes() {
        assert_eq!(size_to_num("12B").unwrap(), 12);
        assert_eq!(size_to_num("12X").unwrap(), 12);
    }

    #[test]
    fn test_size_to_num_invalid() {
        assert!(matches!(size_to_num("MB"), Err(FileApiError::InvalidSize(_))));
        assert!(size_to_num("").is_err());
        assert!(size_to_num("99999999999P").is_err());
    }

    #[test]
    fn test_num_to_size() {
        assert_eq!(num_to_size(1024), "1 KB");
        assert_eq!(num_to_size(10_485_760), "10 MB");
        assert_eq!(num_to_size(107_374_182_400), "100 GB");
        assert_eq!(num_to_size(1_099_511_627_776), "1 TB");
        assert_eq!(num_to_size(500), "500 B");
        assert_eq!(num_to_size(1536), "2 KB");
    }

    #[test]
    fn test_num_to_size_parts() {
        assert_eq!(num_to_size_parts(1_099_511_627_776), (1, "T"));
        assert_eq!(num_to_size_parts(0), (0, ""));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("test.GIF"), "gif");
        assert_eq!(extension("archive.tar.gz"), "gz");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension(".hidden"), "");
        assert_eq!(extension("žluťoučký.PDF"), "pdf");
    }

    #[test]
    fn test_icon() {
        assert_eq!(icon("pdf"), "fa-file-pdf");
        assert_eq!(icon("txt"), "fa-file-text");
        assert_eq!(icon("jpg"), "fa-file-image");
        assert_eq!(icon("docx"), "fa-file-word");
        assert_eq!(icon("csv"), "fa-file-excel");
        assert_eq!(icon("zip"), "fa-file-zipper");
        assert_eq!(icon("flac"), "fa-file-audio");
        assert_eq!(icon("mkv"), "fa-file-video");
        assert_eq!(icon("php"), "fa-file-code");
        assert_eq!(icon("exe"), "fa-file");
        assert_eq!(icon(""), "fa-file");
    }

    #[test]
    fn test_max_upload() {
        assert_eq!(max_upload(0, "2M", "8M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(max_upload(1000, "2M", "8M").unwrap(), 1000);
        assert_eq!(max_upload(u64::MAX, "2M", "8M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(max_upload(0, "", "").unwrap(), 9 * (1u64 << 50));
        assert_eq!(max_upload(0, "", "1K").unwrap(), 1024);
    }
}
