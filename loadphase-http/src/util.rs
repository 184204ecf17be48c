pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://localhost:8080/coupon/apply").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost:8080"));

        let u = url::Url::parse("http://example.com/").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("example.com"));
    }

    #[test]
    fn has_header_ignores_case() {
        let headers = vec![("Content-Type".to_string(), "text/plain".to_string())];
        assert!(has_header(&headers, "content-type"));
        assert!(!has_header(&headers, "host"));
    }
}
