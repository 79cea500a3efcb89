//! Frame Codec: parse and serialize JSON-RPC 2.0 messages.

mod frame;

pub use frame::{
    decode, encode, encode_batch, DecodeOutcome, ElementError, Frame, RequestId, RpcError,
    RpcRequest, RpcResponse, JSONRPC_VERSION,
};
