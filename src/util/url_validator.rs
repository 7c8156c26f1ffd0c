use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Longest image URL accepted into the contents table.
pub const MAX_IMAGE_URL_LEN: usize = 2048;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Embedded credentials are not allowed")]
    Credentials,
    #[error("Private or loopback address not allowed: {0}")]
    PrivateHost(String),
    #[error("URL longer than {MAX_IMAGE_URL_LEN} bytes")]
    TooLong,
}

/// Validate an image URL attached to a post or used as an avatar.
///
/// Image URLs are rendered by every viewer of the feed, so they must be
/// plain public http(s) locations: no credentials, no loopback or private
/// addresses, no other schemes.
pub fn validate_image_url(raw: &str) -> Result<Url, UrlValidationError> {
    if raw.len() > MAX_IMAGE_URL_LEN {
        return Err(UrlValidationError::TooLong);
    }

    let url = parse_http(raw)?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(url::Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(UrlValidationError::PrivateHost(domain.to_owned()));
            }
        }
        Some(url::Host::Ipv4(ip)) => reject_private(IpAddr::V4(ip))?,
        Some(url::Host::Ipv6(ip)) => reject_private(IpAddr::V6(ip))?,
    }

    Ok(url)
}

/// Validate the API base URL the feed client talks to.
///
/// Only the scheme and host are checked; a local server is a normal target.
pub fn validate_api_url(raw: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(raw)?;
    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(url)
}

fn parse_http(raw: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn reject_private(ip: IpAddr) -> Result<(), UrlValidationError> {
    let private = match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
        }
    };
    if private {
        Err(UrlValidationError::PrivateHost(ip.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_accepts_public_https() {
        let url = validate_image_url("https://cdn.example.com/otter.png").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
        assert!(validate_image_url("http://93.184.216.34/a.jpg").is_ok());
    }

    #[test]
    fn test_image_url_rejects_schemes() {
        assert_eq!(
            validate_image_url("ftp://cdn.example.com/a.png"),
            Err(UrlValidationError::UnsupportedScheme("ftp".to_string()))
        );
        assert!(matches!(
            validate_image_url("javascript:alert(1)"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_image_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_image_url_rejects_private_hosts() {
        for raw in [
            "http://localhost/a.png",
            "http://127.0.0.1/a.png",
            "http://10.0.0.8/a.png",
            "http://192.168.1.1/a.png",
            "http://169.254.169.254/latest",
            "http://[::1]/a.png",
            "http://[fd00::1]/a.png",
            "http://[fe80::1]/a.png",
        ] {
            assert!(
                matches!(validate_image_url(raw), Err(UrlValidationError::PrivateHost(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_image_url_rejects_credentials_and_length() {
        assert_eq!(
            validate_image_url("https://user:pw@cdn.example.com/a.png"),
            Err(UrlValidationError::Credentials)
        );
        let long = format!("https://cdn.example.com/{}", "a".repeat(MAX_IMAGE_URL_LEN));
        assert_eq!(validate_image_url(&long), Err(UrlValidationError::TooLong));
    }

    #[test]
    fn test_api_url_allows_local_server() {
        assert!(validate_api_url("http://127.0.0.1:8080").is_ok());
        assert!(validate_api_url("http://localhost:8080/").is_ok());
        assert!(matches!(
            validate_api_url("file:///tmp/sock"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }
}
