use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pibot_common::RemotePcConfig;
use pibot_core::{Invocation, ProcessOutput, ProcessRunner, RemotePc};
use tokio::net::UdpSocket;
use tracing::info;

const SSH_TIMEOUT: Duration = Duration::from_secs(30);

pub type MacAddress = [u8; 6];

pub fn parse_mac(raw: &str) -> Result<MacAddress> {
    let parts: Vec<&str> = raw.trim().split([':', '-']).collect();
    if parts.len() != 6 {
        bail!("invalid MAC address: {raw}");
    }
    let mut mac = [0u8; 6];
    for (slot, part) in mac.iter_mut().zip(parts) {
        if part.len() != 2 {
            bail!("invalid MAC address: {raw}");
        }
        *slot = u8::from_str_radix(part, 16).with_context(|| format!("invalid MAC address: {raw}"))?;
    }
    Ok(mac)
}

/// Wake-on-LAN payload: six 0xFF bytes then the MAC sixteen times.
pub fn magic_packet(mac: &MacAddress) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(mac);
    }
    packet
}

/// The desktop PC on the LAN: woken with a magic packet, shut down over SSH.
pub struct LanRemotePc {
    host: Option<String>,
    mac: Option<MacAddress>,
    broadcast: SocketAddr,
    ssh_user: String,
    shutdown_command: String,
    runner: Arc<dyn ProcessRunner>,
}

impl LanRemotePc {
    pub fn from_config(config: &RemotePcConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let mac = config.mac.as_deref().map(parse_mac).transpose()?;
        let broadcast = config
            .broadcast_addr
            .parse()
            .with_context(|| format!("invalid broadcast address {}", config.broadcast_addr))?;
        Ok(Self {
            host: config.host.clone().filter(|host| !host.trim().is_empty()),
            mac,
            broadcast,
            ssh_user: config.ssh_user.clone(),
            shutdown_command: config.shutdown_command.clone(),
            runner,
        })
    }

    fn ssh_invocation(&self) -> Result<Invocation> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("remote PC host is not configured"))?;
        let target = format!("{}@{}", self.ssh_user, host);
        Ok(Invocation::argv([
            "ssh",
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            target.as_str(),
            self.shutdown_command.as_str(),
        ]))
    }
}

#[async_trait]
impl RemotePc for LanRemotePc {
    async fn wake(&self) -> Result<()> {
        let mac = self
            .mac
            .ok_or_else(|| anyhow!("remote PC MAC address is not configured"))?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to open UDP socket")?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&magic_packet(&mac), self.broadcast)
            .await
            .with_context(|| format!("failed to send magic packet to {}", self.broadcast))?;
        info!(target_addr = %self.broadcast, "magic packet sent");
        Ok(())
    }

    async fn shutdown(&self) -> Result<ProcessOutput> {
        let invocation = self.ssh_invocation()?;
        self.runner.run(invocation, SSH_TIMEOUT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pibot_core::testing::ScriptedRunner;

    fn config() -> RemotePcConfig {
        RemotePcConfig {
            host: Some("192.168.1.20".to_string()),
            mac: Some("AA:bb:cc:00:11:22".to_string()),
            ..RemotePcConfig::default()
        }
    }

    #[test]
    fn parses_mac_with_either_separator() {
        let expected = [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22];
        assert_eq!(parse_mac("aa:bb:cc:00:11:22").expect("colon"), expected);
        assert_eq!(parse_mac("AA-BB-CC-00-11-22").expect("dash"), expected);
        assert!(parse_mac("aa:bb:cc:00:11").is_err());
        assert!(parse_mac("aa:bb:cc:00:11:zz").is_err());
        assert!(parse_mac("aab:b:cc:00:11:22").is_err());
    }

    #[test]
    fn magic_packet_layout() {
        let mac = [1, 2, 3, 4, 5, 6];
        let packet = magic_packet(&mac);
        assert!(packet[..6].iter().all(|b| *b == 0xFF));
        assert_eq!(&packet[6..12], &mac);
        assert_eq!(&packet[96..], &mac);
    }

    #[tokio::test]
    async fn wake_delivers_packet_to_broadcast_address() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let mut cfg = config();
        cfg.broadcast_addr = listener.local_addr().expect("addr").to_string();
        let pc = LanRemotePc::from_config(&cfg, Arc::new(ScriptedRunner::new())).expect("pc");

        pc.wake().await.expect("wake");
        let mut buf = [0u8; 128];
        let (len, _) = listener.recv_from(&mut buf).await.expect("recv");
        assert_eq!(len, 102);
        assert_eq!(&buf[6..12], &[0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22]);
    }

    #[tokio::test]
    async fn shutdown_runs_ssh_command() {
        let runner = Arc::new(ScriptedRunner::new());
        let pc = LanRemotePc::from_config(&config(), runner.clone()).expect("pc");
        let output = pc.shutdown().await.expect("shutdown");
        assert!(output.success());
        let calls = runner.calls();
        let argv = &calls[0].argv;
        assert_eq!(argv[0], "ssh");
        assert!(argv.contains(&"root@192.168.1.20".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("shutdown /s /t 0"));
    }

    #[tokio::test]
    async fn missing_host_or_mac_is_reported() {
        let cfg = RemotePcConfig::default();
        let pc = LanRemotePc::from_config(&cfg, Arc::new(ScriptedRunner::new())).expect("pc");
        assert!(pc.wake().await.is_err());
        assert!(pc.shutdown().await.is_err());
    }
}
