//! Basic and digest (RFC 2617, MD5) authentication.
//!
//! The decoder keeps the `Authorization` header as
//! [`Authorization::Basic`] or [`Authorization::Digest`]; [`Credentials`]
//! checks either one. A failed check is answered with
//! [`request_authentication`], a 401 challenge that leaves the connection
//! open so the peer can retry.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ember_http::connection::Request;
use ember_http::protocol::{Authorization, RequestHead};
use http::StatusCode;
use md5::{Digest, Md5};
use std::fmt;
use tracing::debug;

pub const DEFAULT_REALM: &str = "Login Required";

/// A username and password a handler requires.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    realm: Option<String>,
    digest: bool,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), realm: None, digest: false }
    }

    /// Restricts digest answers to `realm` and names it in the challenge.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Challenges with digest instead of basic authentication.
    #[must_use]
    pub fn with_digest(mut self) -> Self {
        self.digest = true;
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    pub fn is_digest(&self) -> bool {
        self.digest
    }

    /// Both username and password are set.
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Checks the request's `Authorization` header, basic or digest.
    pub fn authenticate(&self, head: &RequestHead) -> bool {
        let authenticated = match head.authorization() {
            Some(Authorization::Basic(token)) => check_basic(token, &self.username, &self.password),
            Some(Authorization::Digest(params)) => {
                check_digest(params, head.method().as_str(), &self.username, &self.password, self.realm())
            }
            None => false,
        };
        debug!(url = head.url(), authenticated, "checked credentials");
        authenticated
    }

    /// Answers `request` with this handler's challenge.
    pub fn challenge(&self, request: &mut Request) {
        request_authentication(request, self.realm(), self.digest);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("realm", &self.realm)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// The basic token for `username:password`.
pub fn basic_token(username: &str, password: &str) -> String {
    STANDARD.encode(format!("{username}:{password}"))
}

pub fn check_basic(token: &str, username: &str, password: &str) -> bool {
    token == basic_token(username, password)
}

/// Verifies the parameters of a `Digest` authorization header.
///
/// `username`, `realm`, `nonce`, `uri` and `response` are required; with a
/// `qop` the response also covers `nc` and `cnonce`. An expected `realm`
/// rejects answers for any other realm.
pub fn check_digest(header: &str, method: &str, username: &str, password: &str, realm: Option<&str>) -> bool {
    let params = digest_params(header);
    let param = |name: &str| params.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| *value);

    let (Some(user), Some(header_realm), Some(nonce), Some(uri), Some(response)) =
        (param("username"), param("realm"), param("nonce"), param("uri"), param("response"))
    else {
        debug!("digest authorization is missing parameters");
        return false;
    };

    if user != username || realm.is_some_and(|realm| realm != header_realm) {
        return false;
    }

    let ha1 = md5_hex(format!("{username}:{header_realm}:{password}").as_bytes());
    let ha2 = md5_hex(format!("{method}:{uri}").as_bytes());
    let expected = match param("qop") {
        Some(qop) => {
            let (Some(nc), Some(cnonce)) = (param("nc"), param("cnonce")) else {
                return false;
            };
            md5_hex(format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}").as_bytes())
        }
        None => md5_hex(format!("{ha1}:{nonce}:{ha2}").as_bytes()),
    };

    expected == response
}

/// Sends a 401 challenge. `realm` defaults to [`DEFAULT_REALM`].
pub fn request_authentication(request: &mut Request, realm: Option<&str>, digest: bool) {
    let realm = realm.unwrap_or(DEFAULT_REALM);
    let challenge = if digest {
        format!("Digest realm=\"{realm}\", qop=\"auth\", nonce=\"{}\", opaque=\"{}\"", random_hex(), random_hex())
    } else {
        format!("Basic realm=\"{realm}\"")
    };

    let response = request.response(StatusCode::UNAUTHORIZED).with_header("WWW-Authenticate", challenge);
    request.send(response);
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

fn random_hex() -> String {
    md5_hex(&rand::random::<[u8; 16]>())
}

/// `key=value` pairs of a digest header, values unquoted.
fn digest_params(header: &str) -> Vec<(&str, &str)> {
    let mut params = Vec::new();
    let mut rest = header.trim();

    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim();
        let after = after.trim_start();

        let (value, next) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim(), &after[end..]),
                None => (after.trim(), ""),
            }
        };

        params.push((key, value));
        rest = next.trim_start().trim_start_matches(',').trim_start();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{parse_head, serve};
    use ember_http::handler::make_handler;
    use indoc::indoc;
    use std::sync::Arc;

    const RFC_DIGEST: &str = indoc! {r#"
        username="Mufasa", realm="testrealm@host.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093",
        uri="/dir/index.html", qop=auth, nc=00000001, cnonce="0a4f113b",
        response="6629fae49393a05397450978507c4ef1", opaque="5ccc069c403ebaf9f0171e9517f40e41""#};

    #[test]
    fn test_basic() {
        assert_eq!(basic_token("admin", "admin"), "YWRtaW46YWRtaW4=");
        assert!(check_basic("YWRtaW46YWRtaW4=", "admin", "admin"));
        assert!(!check_basic("YWRtaW46YWRtaW4=", "admin", "secret"));
    }

    #[test]
    fn test_digest_params() {
        let params = digest_params(r#"username="a,b", qop=auth, nc=00000001"#);
        assert_eq!(params, vec![("username", "a,b"), ("qop", "auth"), ("nc", "00000001")]);
    }

    #[test]
    fn test_digest() {
        assert!(check_digest(RFC_DIGEST, "GET", "Mufasa", "Circle Of Life", None));
        assert!(check_digest(RFC_DIGEST, "GET", "Mufasa", "Circle Of Life", Some("testrealm@host.com")));
        assert!(!check_digest(RFC_DIGEST, "GET", "Mufasa", "Circle Of Life", Some("other")));
        assert!(!check_digest(RFC_DIGEST, "POST", "Mufasa", "Circle Of Life", None));
        assert!(!check_digest(RFC_DIGEST, "GET", "Mufasa", "wrong", None));
        assert!(!check_digest(RFC_DIGEST, "GET", "Simba", "Circle Of Life", None));
        assert!(!check_digest(r#"username="Mufasa""#, "GET", "Mufasa", "Circle Of Life", None));
    }

    #[test]
    fn test_authenticate_head() {
        let credentials = Credentials::new("admin", "admin");
        assert!(credentials.is_configured());
        assert!(!Credentials::new("admin", "").is_configured());

        let basic = parse_head("GET / HTTP/1.1\r\nAuthorization: Basic YWRtaW46YWRtaW4=\r\n\r\n");
        assert!(credentials.authenticate(&basic));

        let anonymous = parse_head("GET / HTTP/1.1\r\n\r\n");
        assert!(!credentials.authenticate(&anonymous));

        let digest = parse_head(&format!("GET / HTTP/1.1\r\nAuthorization: Digest {}\r\n\r\n", RFC_DIGEST.replace('\n', " ")));
        assert!(Credentials::new("Mufasa", "Circle Of Life").authenticate(&digest));
    }

    #[test]
    fn test_basic_challenge() {
        let handler = Arc::new(make_handler(|request: &mut Request| request_authentication(request, None, false)));
        let (_connection, peer) = serve(handler, "GET / HTTP/1.1\r\n\r\n");

        let sent = peer.take_sent_string();
        assert!(sent.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(sent.contains("WWW-Authenticate: Basic realm=\"Login Required\"\r\n"));
        assert!(!peer.close_requested());
    }

    #[test]
    fn test_digest_challenge() {
        let handler = Arc::new(make_handler(|request: &mut Request| {
            Credentials::new("admin", "admin").with_realm("device").with_digest().challenge(request);
        }));
        let (_connection, peer) = serve(handler, "GET / HTTP/1.1\r\n\r\n");

        let sent = peer.take_sent_string();
        let challenge = sent.lines().find_map(|line| line.strip_prefix("WWW-Authenticate: ")).unwrap();
        assert!(challenge.starts_with("Digest realm=\"device\", qop=\"auth\", nonce=\""));

        let params = digest_params(challenge.trim_start_matches("Digest "));
        let nonce = params.iter().find(|(key, _)| *key == "nonce").unwrap().1;
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
