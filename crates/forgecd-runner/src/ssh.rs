//! SSH backend (spec §4.2). Grounded on `original_source/pkg/ssh/runner.go`:
//! TCP connect, user+public-key auth, host key verification disabled by
//! design (spec §9 — re-enable with a configurable known-hosts file in any
//! future revision), shell session, stdin/stdout wiring.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::ChannelStream;
use russh_keys::key::KeyPair;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};

use crate::error::{Result, RunnerError};
use crate::RunnerTransport;

const SSH_PORT: u16 = 22;

/// Accepts all host keys (spec §9: "host key verification is disabled by
/// design in this release").
struct AcceptAllHostKeys;

impl client::Handler for AcceptAllHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshTransport {
    writer: WriteHalf<ChannelStream<client::Msg>>,
    reader: BufReader<ReadHalf<ChannelStream<client::Msg>>>,
    handle: Handle<AcceptAllHostKeys>,
}

impl SshTransport {
    /// Opens a TCP connection to `address:22`, authenticates as `username`
    /// with `private_key` (PEM), opens a session, and requests a shell.
    pub async fn connect(address: &str, username: &str, private_key: &str) -> Result<Self> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, (address, SSH_PORT), AcceptAllHostKeys)
            .await
            .map_err(|e| RunnerError::Construction(format!("ssh connect to {address}: {e}")))?;

        let key_pair = KeyPair::from_pkcs8_pem(private_key, None.into())
            .or_else(|_| KeyPair::from_openssh(private_key))
            .map_err(|e| RunnerError::Construction(format!("invalid private key: {e}")))?;

        let authenticated = handle
            .authenticate_publickey(username, Arc::new(key_pair))
            .await
            .map_err(|e| RunnerError::Construction(format!("ssh auth failed: {e}")))?;
        if !authenticated {
            return Err(RunnerError::Construction(
                "ssh public-key authentication rejected".to_string(),
            ));
        }

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| RunnerError::Construction(format!("ssh channel open failed: {e}")))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| RunnerError::Construction(format!("ssh shell request failed: {e}")))?;

        let stream = channel.into_stream();
        let (read_half, write_half) = tokio::io::split(stream);

        Ok(Self {
            writer: write_half,
            reader: BufReader::new(read_half),
            handle,
        })
    }
}

#[async_trait]
impl RunnerTransport for SshTransport {
    fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        &mut self.writer
    }

    fn reader(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin) {
        &mut self.reader
    }

    /// Closes session then connection (spec §4.2).
    async fn shutdown(&mut self) -> Result<()> {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;
        Ok(())
    }
}
