use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose,
};

pub const CA_CERT_FILE: &str = "ca.crt";
pub const CA_KEY_FILE: &str = "ca.key";

const CA_COMMON_NAME: &str = "pipewright CA";
const CA_VALIDITY_DAYS: i64 = 3650;

/// PEM-encoded CA certificate and private key.
#[derive(Clone)]
pub struct CaMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for CaMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaMaterial")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"[redacted]")
            .finish()
    }
}

pub struct CertificateAuthority;

impl CertificateAuthority {
    /// Load the CA pair from `ca_dir`, generating and persisting a new one on first run.
    #[tracing::instrument(fields(ca_dir = %ca_dir.display()), err)]
    pub async fn init(ca_dir: &Path) -> anyhow::Result<CaMaterial> {
        let cert_path = ca_dir.join(CA_CERT_FILE);
        let key_path = ca_dir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            let cert_pem = tokio::fs::read_to_string(&cert_path)
                .await
                .with_context(|| format!("failed to read {}", cert_path.display()))?;
            let key_pem = tokio::fs::read_to_string(&key_path)
                .await
                .with_context(|| format!("failed to read {}", key_path.display()))?;
            tracing::info!("loaded existing certificate authority");
            return Ok(CaMaterial { cert_pem, key_pem });
        }

        let material = generate()?;
        tokio::fs::create_dir_all(ca_dir)
            .await
            .context("failed to create CA directory")?;
        tokio::fs::write(&cert_path, &material.cert_pem)
            .await
            .with_context(|| format!("failed to write {}", cert_path.display()))?;
        write_private_key(&key_path, &material.key_pem).await?;

        tracing::info!("generated new certificate authority");
        Ok(material)
    }
}

fn generate() -> anyhow::Result<CaMaterial> {
    let mut params =
        CertificateParams::new(Vec::<String>::new()).context("invalid CA parameters")?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, CA_COMMON_NAME);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(CA_VALIDITY_DAYS);

    let key_pair = KeyPair::generate().context("failed to generate CA key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("failed to self-sign CA certificate")?;

    Ok(CaMaterial {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

async fn write_private_key(path: &PathBuf, pem: &str) -> anyhow::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    // Owner read/write only, from creation on
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(pem.as_bytes())
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()
        .await
        .with_context(|| format!("failed to sync {}", path.display()))?;
    Ok(())
}
