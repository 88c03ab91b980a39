//! Connection upgrade hand-off
//!
//! Once the layer stack for an address is built, the raw [`Connection`] is
//! passed to an [`Upgrader`], which typically negotiates a security protocol
//! and stream multiplexing on top of it. Its outcome is what dial and listen
//! report.

use crate::connection::Connection;
use crate::error::TransportError;
use async_trait::async_trait;
use libp2p_identity::PeerId;
use std::convert::Infallible;

/// Consumer of freshly established connections
#[async_trait]
pub trait Upgrader: Send + Sync + 'static {
    /// Upgraded connection
    type Output: Send + 'static;
    /// Upgrade failure
    type Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send;

    /// Secure a connection we dialed, expecting to reach `peer`
    async fn secure_outbound(
        &self,
        connection: Connection,
        peer: PeerId,
    ) -> Result<Self::Output, Self::Error>;

    /// Secure a connection a remote peer opened to us
    async fn secure_inbound(&self, connection: Connection) -> Result<Self::Output, Self::Error>;
}

/// Hands the raw connection through unchanged
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughUpgrader;

#[async_trait]
impl Upgrader for PassthroughUpgrader {
    type Output = Connection;
    type Error = Infallible;

    async fn secure_outbound(
        &self,
        connection: Connection,
        _peer: PeerId,
    ) -> Result<Connection, Infallible> {
        Ok(connection)
    }

    async fn secure_inbound(&self, connection: Connection) -> Result<Connection, Infallible> {
        Ok(connection)
    }
}

pub(crate) fn upgrade_error<E>(err: E) -> TransportError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    TransportError::Upgrade(err.into())
}
