pub mod batch;
pub mod explorer;

pub use batch::{BatchRpcClient, RpcRequest};
pub use explorer::ExplorerHttp;
