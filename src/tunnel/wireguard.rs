//! WireGuard provisioning via the `ip` and `wg` tools.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ProvisionRequest, TunnelError, TunnelProvisioner, WgDeviceConfig, WgPeerConfig};

/// Provisions WireGuard interfaces by shelling out to `ip` and `wg`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WgProvisioner;

impl WgProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Create the interface, deleting a stale one with the same name first.
    async fn ensure_interface(&self, name: &str) -> Result<(), TunnelError> {
        let result = run("ip", &["link", "add", "dev", name, "type", "wireguard"]).await;

        match result {
            Ok(_) => Ok(()),
            Err(TunnelError::ProvisioningExecutionFailed { ref message, .. })
                if message.contains("File exists") =>
            {
                debug!(interface = %name, "replacing existing tunnel interface");
                run("ip", &["link", "del", name]).await?;
                run("ip", &["link", "add", "dev", name, "type", "wireguard"]).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TunnelProvisioner for WgProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<WgDeviceConfig, TunnelError> {
        self.ensure_interface(&request.interface_name).await?;

        // The private key reaches `wg` through a 0600 temp file, never the
        // command line.
        let mut key_file = tempfile::NamedTempFile::new()?;
        std::fs::set_permissions(key_file.path(), std::fs::Permissions::from_mode(0o600))?;
        key_file.write_all(request.private_key.as_bytes())?;
        key_file.flush()?;

        let key_path = key_file.path().to_string_lossy().into_owned();
        let port = request.listen_port.to_string();
        run(
            "wg",
            &[
                "set",
                &request.interface_name,
                "listen-port",
                &port,
                "private-key",
                &key_path,
                "peer",
                &request.peer_public_key,
                "allowed-ips",
                "0.0.0.0/0",
                "endpoint",
                &request.peer_endpoint,
            ],
        )
        .await?;

        run("ip", &["link", "set", "up", &request.interface_name]).await?;

        let dump = run("wg", &["showconf", &request.interface_name]).await?;
        let config = parse_device_config(&dump)?;
        verify_effective(request, &config)?;

        info!(
            interface = %request.interface_name,
            listen_port = request.listen_port,
            endpoint = %request.peer_endpoint,
            "tunnel interface provisioned"
        );

        Ok(config)
    }
}

/// Generate a WireGuard keypair via `wg genkey` / `wg pubkey`.
///
/// Returns (public key, private key), both base64.
pub async fn generate_tunnel_keypair() -> Result<(String, String), TunnelError> {
    let private_key = run("wg", &["genkey"]).await?.trim().to_string();

    let mut child = Command::new("wg")
        .arg("pubkey")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TunnelError::ProvisioningExecutionFailed {
            command: "wg pubkey".to_string(),
            message: e.to_string(),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        stdin.write_all(private_key.as_bytes()).await?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| TunnelError::ProvisioningExecutionFailed {
            command: "wg pubkey".to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(command_failure("wg pubkey", &output.stdout, &output.stderr));
    }

    let public_key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((public_key, private_key))
}

/// Run a command, capturing output; nonzero exit becomes an execution
/// failure carrying whichever of stderr/stdout has the diagnostics.
async fn run(command: &str, args: &[&str]) -> Result<String, TunnelError> {
    let rendered = format!("{} {}", command, args.join(" "));
    debug!(command = %rendered, "running");

    let output = Command::new(command)
        .args(args)
        .output()
        .await
        .map_err(|e| TunnelError::ProvisioningExecutionFailed {
            command: rendered.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(command_failure(&rendered, &output.stdout, &output.stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn command_failure(command: &str, stdout: &[u8], stderr: &[u8]) -> TunnelError {
    let message = if stderr.is_empty() { stdout } else { stderr };
    TunnelError::ProvisioningExecutionFailed {
        command: command.to_string(),
        message: String::from_utf8_lossy(message).trim().to_string(),
    }
}

/// Parse a `wg showconf` dump.
///
/// The format is INI-like: an `[Interface]` section with PrivateKey and
/// ListenPort, then one `[Peer]` section per peer.
fn parse_device_config(dump: &str) -> Result<WgDeviceConfig, TunnelError> {
    let mut config = WgDeviceConfig::default();
    let mut peer: Option<WgPeerConfig> = None;
    let mut listen_port = None;

    for line in dump.lines() {
        let line = line.trim();
        if line == "[Peer]" {
            if let Some(done) = peer.take() {
                config.peer.get_or_insert(done);
            }
            peer = Some(WgPeerConfig::default());
            continue;
        }

        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };

        match (&mut peer, key) {
            (None, "PrivateKey") => config.private_key = value.to_string(),
            (None, "ListenPort") => {
                listen_port = Some(value.parse::<u16>().map_err(|_| {
                    TunnelError::ConfigParse(format!("bad ListenPort: {}", value))
                })?);
            }
            (Some(p), "PublicKey") => p.public_key = value.to_string(),
            (Some(p), "AllowedIPs") => p.allowed_ips = value.to_string(),
            (Some(p), "Endpoint") => p.endpoint = value.to_string(),
            _ => {}
        }
    }
    if let Some(done) = peer.take() {
        config.peer.get_or_insert(done);
    }

    if config.private_key.is_empty() {
        return Err(TunnelError::ConfigParse("missing PrivateKey".to_string()));
    }
    config.listen_port =
        listen_port.ok_or_else(|| TunnelError::ConfigParse("missing ListenPort".to_string()))?;

    Ok(config)
}

/// Check the live configuration against what was requested.
fn verify_effective(
    request: &ProvisionRequest,
    config: &WgDeviceConfig,
) -> Result<(), TunnelError> {
    if config.private_key != request.private_key || config.listen_port != request.listen_port {
        return Err(TunnelError::ProvisioningVerificationFailed);
    }
    Ok(())
}
