//! A small remote-method-invocation transport.
//!
//! A [`Skeleton`] is a multithreaded TCP server bound to a declared remote
//! interface; a [`RawStub`] is the client-side proxy that marshals a call as
//! `(method name, positional arguments, argument-type descriptors)` and
//! unmarshals either the return value or the error the remote implementation
//! raised. Interfaces are declared as static [`InterfaceSpec`] dispatch
//! tables; a remote interface is one whose every method declares the
//! transport's `Remote` error kind in its failure set.

mod interface;
mod skeleton;
mod stub;
mod wire;

pub use interface::{InterfaceSpec, MethodSpec, REMOTE_ERROR_KIND};
pub use skeleton::{CallHandler, Skeleton};
pub use stub::RawStub;
pub use wire::{error_value, fault_error, CallReply, MAX_FRAME_LEN};
