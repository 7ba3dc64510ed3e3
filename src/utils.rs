use axum::http::header::HeaderValue;
use std::net::IpAddr;
use std::str::FromStr;

/// Extracts left-most IP address from given `X-Forwarded-For` HTTP header.
pub fn forwarded_header_ip(header_value: &HeaderValue) -> Option<IpAddr> {
    IpAddr::from_str(
        std::str::from_utf8(header_value.as_bytes())
            .ok()?
            .split(',')
            .next()?
            .trim(),
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_ip_is_left_most() {
        let header = HeaderValue::from_static("203.0.113.7, 10.0.0.1");
        assert_eq!(forwarded_header_ip(&header), "203.0.113.7".parse().ok());

        let single = HeaderValue::from_static("2001:db8::1");
        assert_eq!(forwarded_header_ip(&single), "2001:db8::1".parse().ok());

        assert_eq!(forwarded_header_ip(&HeaderValue::from_static("unknown")), None);
    }
}
