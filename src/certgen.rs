//! Certificate generation by shelling out to `openssl`.
//!
//! Produces everything mutual TLS needs for one domain: a self-made CA, a
//! client key pair signed by it, and a `.pfx` bundle browsers can install
//! (serve that with [`Registry::handle_pfx`](crate::Registry::handle_pfx)).
//!
//! `openssl` is treated as an opaque collaborator: individual command
//! failures are not inspected, only the final modulus comparison decides
//! whether the generated certificate and key actually belong together.

use std::path::Path;
use std::process::Command;

/// Generates `<domain>.ca.{key,crt}`, `<domain>.ssl.{key,crt}`, and
/// `<domain>.ssl.pfx` under `dir`.
///
/// Blocking — run it at setup time, not inside a handler. Returns whether
/// the generated certificate and private key moduli match.
pub fn make_tls_files(
    pass_root: &str,
    pass_key: &str,
    pass_pfx: &str,
    dir: impl AsRef<Path>,
    domain: &str,
    email: &str,
) -> std::io::Result<bool> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let base = dir.join(domain);
    let base = base.to_string_lossy();

    let ca_key = format!("{base}.ca.key");
    let ca_csr = format!("{base}.ca.csr");
    let ca_crt = format!("{base}.ca.crt");
    let ssl_key = format!("{base}.ssl.key");
    let ssl_csr = format!("{base}.ssl.csr");
    let ssl_crt = format!("{base}.ssl.crt");
    let ssl_pfx = format!("{base}.ssl.pfx");
    let subject = format!(
        "/C=US/ST=None/L=None/O=strand/OU=strand/CN={domain}/emailAddress={email}"
    );

    // CA: key, signing request, self-signed root cert.
    openssl(&["genrsa", "-des3", "-passout", &format!("pass:{pass_root}"), "-out", &ca_key, "2048"]);
    openssl(&[
        "req", "-passin", &format!("pass:{pass_root}"), "-new", "-subj", &subject,
        "-key", &ca_key, "-out", &ca_csr,
    ]);
    openssl(&[
        "x509", "-passin", &format!("pass:{pass_root}"), "-req", "-days", "3650", "-sha256",
        "-extensions", "v3_ca", "-signkey", &ca_key, "-in", &ca_csr, "-out", &ca_crt,
    ]);
    let _ = std::fs::remove_file(&ca_csr);

    // Client pair: key (passphrase stripped), request, CA-signed cert.
    openssl(&["genrsa", "-des3", "-passout", &format!("pass:{pass_key}"), "-out", &ssl_key, "2048"]);
    openssl(&["rsa", "-passin", &format!("pass:{pass_key}"), "-in", &ssl_key, "-out", &ssl_key]);
    openssl(&["req", "-new", "-subj", &subject, "-key", &ssl_key, "-out", &ssl_csr]);
    openssl(&[
        "x509", "-passin", &format!("pass:{pass_root}"), "-req", "-days", "365", "-sha256",
        "-extensions", "v3_req", "-CA", &ca_crt, "-CAkey", &ca_key, "-CAcreateserial",
        "-in", &ssl_csr, "-out", &ssl_crt,
    ]);
    let _ = std::fs::remove_file(&ssl_csr);
    let _ = std::fs::remove_file(format!("{base}.srl"));

    // Bundle cert + key into an installable pfx.
    openssl(&[
        "pkcs12", "-export", "-passout", &format!("pass:{pass_pfx}"),
        "-in", &ssl_crt, "-inkey", &ssl_key, "-out", &ssl_pfx,
    ]);

    let crt_modulus = openssl(&["x509", "-noout", "-modulus", "-in", &ssl_crt]);
    let key_modulus = openssl(&["rsa", "-noout", "-modulus", "-in", &ssl_key]);
    Ok(!crt_modulus.is_empty() && crt_modulus == key_modulus)
}

/// Runs one `openssl` invocation, returning its combined stdout (empty on
/// spawn failure).
fn openssl(args: &[&str]) -> Vec<u8> {
    match Command::new("openssl").args(args).output() {
        Ok(out) => out.stdout,
        Err(_) => Vec::new(),
    }
}
