// Registry entry types.  One FdKind per slot; the slot index is the native
// descriptor value itself.

use serde::{Deserialize, Serialize};

use sysdefs::constants::net_const::{SockFamily, SockProto, SockType};

/// What a registry slot currently describes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FdKind {
    /// No live descriptor occupies this index.
    #[default]
    Unused,
    /// A regular file.  `mode` holds `FILE_MODE_*` bits and `perm` the
    /// permission bits it was opened with.  The path is owned by the entry.
    File {
        /// `FILE_MODE_*` bits.
        mode: u32,
        /// Octal permission bits.
        perm: u32,
        /// Owned copy of the path, if the opener knew one.
        path: Option<String>,
    },
    /// A socket, with the portable triple it was created from.  Accepted
    /// sockets carry the listener's triple.
    Socket {
        /// Address family.
        family: SockFamily,
        /// Stream, datagram or raw.
        sock_type: SockType,
        /// Protocol.
        proto: SockProto,
    },
    /// One end of a pipe (or a FIFO, when it has a path).
    Pipe {
        /// Owned copy of the FIFO path, if any.
        path: Option<String>,
    },
}

impl FdKind {
    /// Convenience constructor for socket entries.
    pub fn socket(family: SockFamily, sock_type: SockType, proto: SockProto) -> Self {
        FdKind::Socket {
            family,
            sock_type,
            proto,
        }
    }

    /// True for anything but `Unused`.
    pub fn is_live(&self) -> bool {
        !matches!(self, FdKind::Unused)
    }

    /// The socket triple, if this entry is a socket.
    pub fn socket_info(&self) -> Option<(SockFamily, SockType, SockProto)> {
        match self {
            FdKind::Socket {
                family,
                sock_type,
                proto,
            } => Some((*family, *sock_type, *proto)),
            _ => None,
        }
    }

    /// The owned path of a file or pipe entry.
    pub fn path(&self) -> Option<&str> {
        match self {
            FdKind::File { path, .. } | FdKind::Pipe { path } => path.as_deref(),
            _ => None,
        }
    }
}
