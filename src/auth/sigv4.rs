//! Presigned websocket URL for the MQTT device gateway
//!
//! The broker authenticates websocket upgrades by a SigV4 query-string
//! presigned `GET /mqtt` request. Only the `host` header is signed and the
//! session token, when there is one, is appended after the signature without
//! being part of the canonical request.

use super::AuthError;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SessionTokenMode, SignableBody, SignableRequest, SignatureLocation, SigningParams,
    SigningSettings,
};
use aws_sigv4::sign::v4;
use std::iter;
use std::time::{Duration, SystemTime};
use url::form_urlencoded;

/// Signing name of the MQTT device gateway
pub const SERVICE: &str = "iotdevicegateway";
/// Validity of a presigned URL
pub const PRESIGN_EXPIRES: Duration = Duration::from_secs(86_400);
pub const WEBSOCKET_PATH: &str = "/mqtt";

const SECURITY_TOKEN_PARAM: &str = "X-Amz-Security-Token";

/// Build the `wss://` URL for `authority` (host, or host:port when not 443)
/// signed for `region` at `time`
pub fn presign_websocket_url(
    authority: &str,
    region: &str,
    credentials: &Credentials,
    time: SystemTime,
) -> Result<String, AuthError> {
    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.expires_in = Some(PRESIGN_EXPIRES);
    settings.session_token_mode = SessionTokenMode::Exclude;

    let identity = credentials.clone().into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SERVICE)
        .time(time)
        .settings(settings)
        .build()
        .map_err(|e| AuthError::Signing(e.into()))?
        .into();

    let base_url = format!("wss://{authority}{WEBSOCKET_PATH}");
    let request = SignableRequest::new(
        "GET",
        base_url.as_str(),
        iter::once(("host", authority)),
        SignableBody::Bytes(&[]),
    )
    .map_err(|e| AuthError::Signing(e.into()))?;
    let (instructions, _signature) = sign(request, &params)
        .map_err(|e| AuthError::Signing(e.into()))?
        .into_parts();

    let mut query: Vec<String> = instructions
        .params()
        .iter()
        .filter(|(name, _)| *name != SECURITY_TOKEN_PARAM)
        .map(|(name, value)| format!("{}={}", encode(name), encode(value)))
        .collect();
    if let Some(token) = credentials.session_token() {
        query.push(format!("{SECURITY_TOKEN_PARAM}={}", encode(token)));
    }

    Ok(format!("{base_url}?{}", query.join("&")))
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2015-08-30T12:36:00Z
    fn fixed_time() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_440_938_160)
    }

    fn creds() -> Credentials {
        Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            None,
            None,
            "test",
        )
    }

    fn with_token(token: &str) -> Credentials {
        Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            Some(token.to_string()),
            None,
            "test",
        )
    }

    fn presign(authority: &str, region: &str, credentials: &Credentials, time: SystemTime) -> String {
        presign_websocket_url(authority, region, credentials, time).unwrap()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
    }

    #[test]
    fn test_presigned_url_structure() {
        let url = presign(
            "abc123-ats.iot.us-east-1.amazonaws.com",
            "us-east-1",
            &creds(),
            fixed_time(),
        );

        assert!(url.starts_with("wss://abc123-ats.iot.us-east-1.amazonaws.com/mqtt?"));
        assert_eq!(query_param(&url, "X-Amz-Algorithm"), Some("AWS4-HMAC-SHA256"));
        assert_eq!(
            query_param(&url, "X-Amz-Credential"),
            Some("AKIDEXAMPLE%2F20150830%2Fus-east-1%2Fiotdevicegateway%2Faws4_request")
        );
        assert_eq!(query_param(&url, "X-Amz-Date"), Some("20150830T123600Z"));
        assert_eq!(query_param(&url, "X-Amz-Expires"), Some("86400"));
        assert_eq!(query_param(&url, "X-Amz-SignedHeaders"), Some("host"));
        assert_eq!(query_param(&url, "X-Amz-Security-Token"), None);
    }

    #[test]
    fn test_known_signature() {
        // Same inputs signed with botocore's SigV4QueryAuth
        let url = presign(
            "abc123-ats.iot.us-east-1.amazonaws.com",
            "us-east-1",
            &creds(),
            fixed_time(),
        );

        assert_eq!(
            query_param(&url, "X-Amz-Signature"),
            Some("8fecb92673c2af866a1766cb0ab6776d13bde9d3ab86758eb0dd7b1fb2bed4b8")
        );
    }

    #[test]
    fn test_signature_depends_on_inputs() {
        let base = presign("host.example", "eu-west-1", &creds(), fixed_time());
        let signature = |url: &str| query_param(url, "X-Amz-Signature").unwrap().to_string();

        let other_region = presign("host.example", "us-west-2", &creds(), fixed_time());
        let other_host = presign("other.example", "eu-west-1", &creds(), fixed_time());
        let later = presign(
            "host.example",
            "eu-west-1",
            &creds(),
            fixed_time() + Duration::from_secs(1),
        );
        let other_secret = presign(
            "host.example",
            "eu-west-1",
            &Credentials::new("AKIDEXAMPLE", "another-secret", None, None, "test"),
            fixed_time(),
        );

        for url in [other_region, other_host, later, other_secret] {
            assert_ne!(signature(&base), signature(&url));
        }
    }

    #[test]
    fn test_session_token_appended_after_signature() {
        let url = presign(
            "host.example",
            "us-east-1",
            &with_token("token/with+chars="),
            fixed_time(),
        );

        let signature_at = url.find("X-Amz-Signature=").unwrap();
        let token_at = url.find("X-Amz-Security-Token=").unwrap();
        assert!(token_at > signature_at);
        assert!(url.ends_with("X-Amz-Security-Token=token%2Fwith%2Bchars%3D"));
        assert_eq!(url.matches("X-Amz-Security-Token=").count(), 1);

        // The token is not signed, so the signature matches the tokenless URL
        let plain = presign("host.example", "us-east-1", &creds(), fixed_time());
        assert_eq!(
            query_param(&url, "X-Amz-Signature"),
            query_param(&plain, "X-Amz-Signature")
        );
    }

    #[test]
    fn test_non_default_port_is_part_of_signed_host() {
        let default = presign("host.example", "us-east-1", &creds(), fixed_time());
        let custom = presign("host.example:8443", "us-east-1", &creds(), fixed_time());

        assert!(custom.starts_with("wss://host.example:8443/mqtt?"));
        assert_ne!(
            query_param(&default, "X-Amz-Signature"),
            query_param(&custom, "X-Amz-Signature")
        );
    }
}
