pub mod rpc;
pub mod traits;

pub use rpc::{HttpTransport, RpcPool};
pub use traits::JsonRpcTransport;
