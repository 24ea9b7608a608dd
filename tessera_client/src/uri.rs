//! URI helpers for tenant-specific endpoints

use url::Url;

/// Replaces the subdomain of `uri` with the given tenant subdomain
///
/// Everything up to the first `.` of the host is replaced; path, query, and
/// fragment are preserved. When no subdomain is requested the URI is returned
/// unchanged. A blank subdomain or a host without a `.` also leaves the URI
/// unchanged; that case is logged, not an error.
#[must_use]
pub fn replace_subdomain(uri: &Url, subdomain: Option<&str>) -> Url {
    let Some(subdomain) = subdomain else {
        return uri.clone();
    };

    let subdomain = subdomain.trim();
    if !subdomain.is_empty() {
        if let Some(host) = uri.host_str() {
            if let Some(dot) = host.find('.') {
                let new_host = format!("{}{}", subdomain, &host[dot..]);
                let mut replaced = uri.clone();
                if replaced.set_host(Some(&new_host)).is_ok() {
                    return replaced;
                }
                tracing::error!(uri = %uri, subdomain, "subdomain replacement produced a malformed host");
                return uri.clone();
            }
        }
    }

    tracing::warn!(uri = %uri, subdomain, "the subdomain of the URI is not replaced");
    uri.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_the_first_host_label() {
        let uri = Url::parse("https://paas.auth.example.com/oauth/token?a=b#frag").unwrap();
        let replaced = replace_subdomain(&uri, Some("tenant"));
        assert_eq!(
            replaced.as_str(),
            "https://tenant.auth.example.com/oauth/token?a=b#frag"
        );
    }

    #[test]
    fn no_subdomain_leaves_uri_unchanged() {
        let uri = Url::parse("https://paas.auth.example.com/oauth/token").unwrap();
        assert_eq!(replace_subdomain(&uri, None), uri);
    }

    #[test]
    fn blank_subdomain_leaves_uri_unchanged() {
        let uri = Url::parse("https://paas.auth.example.com/oauth/token").unwrap();
        assert_eq!(replace_subdomain(&uri, Some("  ")), uri);
    }

    #[test]
    fn dotless_host_leaves_uri_unchanged() {
        let uri = Url::parse("https://localhost:8080/oauth/token").unwrap();
        assert_eq!(replace_subdomain(&uri, Some("tenant")), uri);
    }
}
