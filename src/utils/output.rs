use once_cell::sync::Lazy;
use regex::Regex;

static ERROR_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)error|exception|traceback|failed|fatal").expect("error keyword pattern")
});

/// 判断一段输出是否为错误
///
/// 只看关键字，不看来自哪个流：Python 的普通日志默认也写到 stderr
pub fn is_error_output(chunk: &str) -> bool {
    ERROR_KEYWORDS.is_match(chunk)
}

/// 将一行原始输出解码为文本，去掉行尾换行
///
/// 子进程被要求输出 UTF-8，非法字节按替换字符处理
pub fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && matches!(raw[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traceback_and_fatal_match_in_any_case() {
        assert!(is_error_output("Traceback (most recent call last):"));
        assert!(is_error_output("TRACEBACK"));
        assert!(is_error_output("Fatal Python error: init_fs_encoding"));
        assert!(is_error_output("fatal"));
        assert!(is_error_output("ModuleNotFoundError: No module named 'flask'"));
        assert!(is_error_output("Address already in use: bind failed"));
    }

    #[test]
    fn benign_log_lines_do_not_match() {
        assert!(!is_error_output(" * Serving Flask app 'app'"));
        assert!(!is_error_output("WARNING: This is a development server."));
        assert!(!is_error_output(" * Running on http://127.0.0.1:11459"));
    }

    #[test]
    fn decode_strips_line_endings() {
        assert_eq!(decode_line(b"ready\r\n"), "ready");
        assert_eq!(decode_line(b"ready"), "ready");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn decode_replaces_invalid_bytes() {
        let line = decode_line(b"\xe7\x9f\xa9\xe9\x98\xb5 \xff\n");
        assert!(line.starts_with("矩阵 "));
        assert!(line.ends_with('\u{FFFD}'));
    }
}
