use dfs_lib::{DfsError, DfsResult};

/// Error kind every method of a remote interface must declare.
pub const REMOTE_ERROR_KIND: &str = "Remote";

/// One method of a remote interface: the wire name, the argument-type
/// descriptors the stub sends, and the error kinds the method may raise.
#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub name: &'static str,
    pub arg_types: &'static [&'static str],
    pub errors: &'static [&'static str],
}

/// A remote interface as a static dispatch table.
///
/// The skeleton resolves incoming calls against this table by method name
/// plus argument-type descriptors, so two stubs generated against the same
/// table interoperate on the wire.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceSpec {
    pub name: &'static str,
    pub methods: &'static [MethodSpec],
}

impl InterfaceSpec {
    /// Resolves a method by name and argument-type descriptors.
    pub fn resolve(&self, name: &str, arg_types: &[String]) -> Option<&'static MethodSpec> {
        self.methods.iter().find(|m| {
            m.name == name
                && m.arg_types.len() == arg_types.len()
                && m.arg_types.iter().zip(arg_types).all(|(a, b)| a == b)
        })
    }

    pub fn method(&self, name: &str) -> Option<&'static MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Rejects interfaces whose methods do not all declare the transport's
    /// `Remote` error kind in their failure set.
    pub fn ensure_remote(&self) -> DfsResult<()> {
        for method in self.methods {
            if !method.errors.contains(&REMOTE_ERROR_KIND) {
                return Err(DfsError::NotRemoteInterface(format!(
                    "method {}.{} does not declare the {} error kind",
                    self.name, method.name, REMOTE_ERROR_KIND
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static GOOD: InterfaceSpec = InterfaceSpec {
        name: "Good",
        methods: &[
            MethodSpec {
                name: "ping",
                arg_types: &[],
                errors: &["Remote"],
            },
            MethodSpec {
                name: "echo",
                arg_types: &["string"],
                errors: &["NotFound", "Remote"],
            },
        ],
    };

    static BAD: InterfaceSpec = InterfaceSpec {
        name: "Bad",
        methods: &[MethodSpec {
            name: "local_only",
            arg_types: &[],
            errors: &["NotFound"],
        }],
    };

    #[test]
    fn remote_check_requires_remote_error_everywhere() {
        assert!(GOOD.ensure_remote().is_ok());
        assert!(matches!(
            BAD.ensure_remote(),
            Err(DfsError::NotRemoteInterface(_))
        ));
    }

    #[test]
    fn resolve_matches_name_and_argument_types() {
        assert!(GOOD.resolve("ping", &[]).is_some());
        assert!(GOOD.resolve("echo", &["string".to_string()]).is_some());
        assert!(GOOD.resolve("echo", &[]).is_none());
        assert!(GOOD.resolve("missing", &[]).is_none());
    }
}
