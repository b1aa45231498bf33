//! Client-side wire transport for the fastcp RPC surface.
//!
//! Implements [`NamenodeRpc`](fastcp_rpc::NamenodeRpc),
//! [`DatanodeRpc`](fastcp_rpc::DatanodeRpc), and
//! [`DatanodeConnector`](fastcp_rpc::DatanodeConnector) over plain TCP:
//!
//! - [`NamenodeRequest`]/[`NamenodeResponse`] and
//!   [`DatanodeRequest`]/[`DatanodeResponse`] — the wire protocol
//!   (postcard-serialized).
//! - [`IpcNamenode`] / [`IpcDatanode`] — one persistent connection per
//!   endpoint, re-dialed transparently after transport failures.
//!
//! The namenode and datanode services themselves are not part of this
//! workspace; any server speaking this frame format works.

mod datanode;
mod message;
mod namenode;
mod transport;

pub use datanode::{DEFAULT_DATANODE_TIMEOUT, IpcDatanode, IpcDatanodeConnector};
pub use message::{DatanodeRequest, DatanodeResponse, NamenodeRequest, NamenodeResponse};
pub use namenode::IpcNamenode;
