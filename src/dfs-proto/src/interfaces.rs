use rmi::{InterfaceSpec, MethodSpec};

/// Client-facing interface of the naming server.
pub static SERVICE_INTERFACE: InterfaceSpec = InterfaceSpec {
    name: "Service",
    methods: &[
        MethodSpec {
            name: "is_directory",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "list",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "create_file",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "IllegalState", "Remote"],
        },
        MethodSpec {
            name: "create_directory",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "delete",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "get_storage",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "lock",
            arg_types: &["path", "bool"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "unlock",
            arg_types: &["path", "bool"],
            errors: &["NullArg", "IllegalArg", "IllegalState", "Remote"],
        },
    ],
};

/// Interface storage servers use to announce themselves to the naming
/// server.
pub static REGISTRATION_INTERFACE: InterfaceSpec = InterfaceSpec {
    name: "Registration",
    methods: &[MethodSpec {
        name: "register",
        arg_types: &["storage_ref", "command_ref", "path[]"],
        errors: &["NullArg", "AlreadyRegistered", "Remote"],
    }],
};

/// Client-facing interface of a storage server.
pub static STORAGE_INTERFACE: InterfaceSpec = InterfaceSpec {
    name: "Storage",
    methods: &[
        MethodSpec {
            name: "size",
            arg_types: &["path"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
        MethodSpec {
            name: "read",
            arg_types: &["path", "u64", "u64"],
            errors: &["NullArg", "NotFound", "OutOfRange", "Remote"],
        },
        MethodSpec {
            name: "write",
            arg_types: &["path", "u64", "bytes"],
            errors: &["NullArg", "NotFound", "OutOfRange", "Remote"],
        },
    ],
};

/// Interface the naming server uses to command a storage server.
pub static COMMAND_INTERFACE: InterfaceSpec = InterfaceSpec {
    name: "Command",
    methods: &[
        MethodSpec {
            name: "create",
            arg_types: &["path"],
            errors: &["NullArg", "Remote"],
        },
        MethodSpec {
            name: "delete",
            arg_types: &["path"],
            errors: &["NullArg", "Remote"],
        },
        MethodSpec {
            name: "copy",
            arg_types: &["path", "storage_ref"],
            errors: &["NullArg", "NotFound", "Remote"],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_interfaces_are_remote() {
        for spec in [
            &SERVICE_INTERFACE,
            &REGISTRATION_INTERFACE,
            &STORAGE_INTERFACE,
            &COMMAND_INTERFACE,
        ] {
            spec.ensure_remote().unwrap();
        }
    }
}
