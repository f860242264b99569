use chrono::{DateTime, Utc};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::{Digest, Sha256};

const AUTH_SCHEME: &str = "HMAC-SHA256";
const SERVICE: &str = "tls";
const TERMINATOR: &str = "request";

// Must list, sorted and lower-cased, the headers built in `canonical_headers`.
pub const SIGNED_HEADERS: &str = "content-type;host;x-content-sha256;x-date";

/// The parts of an outgoing request covered by the signature.
#[derive(Debug, Clone)]
pub struct RequestToSign<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub content_sha256: String,
    pub authorization: String,
}

/// Sign creates the authorization headers for a request.
///
/// The scheme follows the AWS Signature Version 4 layout: a canonical request
/// is hashed into a string to sign, which is then signed with a key derived
/// from the secret, the date, the region and the service name.
pub fn sign(
    access_key: &str,
    secret_key: &str,
    region: &str,
    timestamp: DateTime<Utc>,
    request: &RequestToSign<'_>,
) -> Result<SignedHeaders, InvalidLength> {
    let date_time = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = timestamp.format("%Y%m%d").to_string();
    let content_sha256 = hex::encode(Sha256::digest(request.body));

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        canonical_headers(request, &content_sha256, &date_time),
        SIGNED_HEADERS,
        content_sha256,
    );
    let credential_scope = format!("{}/{}/{}/{}", date, region, SERVICE, TERMINATOR);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        AUTH_SCHEME,
        date_time,
        credential_scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes())),
    );

    let signing_key = derive_signing_key(secret_key, &date, region)?;
    let signature = hex::encode(hash_hmac(&signing_key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        date: date_time,
        content_sha256,
        authorization: format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            AUTH_SCHEME, access_key, credential_scope, SIGNED_HEADERS, signature
        ),
    })
}

fn canonical_headers(request: &RequestToSign<'_>, content_sha256: &str, date_time: &str) -> String {
    format!(
        "content-type:{}\nhost:{}\nx-content-sha256:{}\nx-date:{}\n",
        request.content_type.trim(),
        request.host.trim(),
        content_sha256,
        date_time,
    )
}

/// Each component is hashed in order, the result keying the next hash:
/// secret, date (YYYYMMDD), region, service, and the fixed terminator.
fn derive_signing_key(secret_key: &str, date: &str, region: &str) -> Result<Vec<u8>, InvalidLength> {
    let date_key = hash_hmac(secret_key.as_bytes(), date.as_bytes())?;
    let region_key = hash_hmac(&date_key, region.as_bytes())?;
    let service_key = hash_hmac(&region_key, SERVICE.as_bytes())?;
    hash_hmac(&service_key, TERMINATOR.as_bytes())
}

type HmacSha256 = Hmac<Sha256>;

fn hash_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
    Ok(<HmacSha256 as Mac>::new_from_slice(key)?
        .chain_update(data)
        .finalize()
        .into_bytes()
        .to_vec())
}
