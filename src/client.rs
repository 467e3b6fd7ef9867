//! Outbound GET helpers.
//!
//! Thin wrappers over a [`reqwest`] client for the three fetch modes the
//! server side tends to need: plain HTTP, HTTPS against self-signed
//! endpoints, and mutual TLS with a client identity.

use bytes::Bytes;

use crate::error::Error;

/// Plain GET; returns the body bytes.
pub async fn http_get(url: &str) -> Result<Bytes, Error> {
    Ok(reqwest::get(url).await?.bytes().await?)
}

/// GET with certificate verification disabled.
///
/// For talking to endpoints serving self-signed certificates (e.g. a peer
/// whose cert came out of [`certgen`](crate::certgen)). Do not point this at
/// hosts you do not control.
pub async fn https_get(url: &str) -> Result<Bytes, Error> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()?;
    Ok(client.get(url).send().await?.bytes().await?)
}

/// Mutual-TLS GET: trusts the CA at `ca_path` and presents the client
/// identity from `cert_path` + `key_path` (PEM).
pub async fn tls_get(
    url: &str,
    ca_path: &str,
    cert_path: &str,
    key_path: &str,
) -> Result<Bytes, Error> {
    let ca_pem = tokio::fs::read(ca_path).await?;
    let mut identity_pem = tokio::fs::read(cert_path).await?;
    identity_pem.extend(tokio::fs::read(key_path).await?);

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca_pem)?)
        .identity(reqwest::Identity::from_pem(&identity_pem)?)
        .danger_accept_invalid_certs(true)
        .build()?;
    Ok(client.get(url).send().await?.bytes().await?)
}
