use bitflags::bitflags;

/// MySQL command bytes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandByte {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    FieldList = 0x04,
    Ping = 0x0e,
    ChangeUser = 0x11,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtSendLongData = 0x18,
    StmtClose = 0x19,
    StmtReset = 0x1a,
    SetOption = 0x1b,
    StmtFetch = 0x1c,
    ResetConnection = 0x1f,
}

/// Negotiated capability flags of a connection.
///
/// A plain 32-bit value. Each feature has an `is_*` predicate and a `set_*`
/// mutator; there is no way to clear a bit. The flags are built on a local
/// copy during negotiation and handed to the session afterwards, which only
/// exposes them by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilityFlags(u32);

macro_rules! capability_features {
    ($( $(#[$doc:meta])* $name:ident = $bit:expr, $is:ident, $set:ident; )*) => {
        impl CapabilityFlags {
            $(
                $(#[$doc])*
                pub const $name: CapabilityFlags = CapabilityFlags($bit);
            )*

            $(
                #[inline]
                pub const fn $is(&self) -> bool {
                    self.0 & $bit != 0
                }

                #[inline]
                pub fn $set(&mut self) {
                    self.0 |= $bit;
                }
            )*
        }

        /// Every named feature with its predicate and mutator.
        #[cfg(test)]
        pub(crate) const CAPABILITY_FEATURES: &[(
            &str,
            fn(&CapabilityFlags) -> bool,
            fn(&mut CapabilityFlags),
        )] = &[$( (stringify!($name), CapabilityFlags::$is, CapabilityFlags::$set) ),*];
    };
}

capability_features! {
    CLIENT_LONG_PASSWORD = 0x0000_0001, is_long_password, set_long_password;
    CLIENT_FOUND_ROWS = 0x0000_0002, is_found_rows, set_found_rows;
    /// Column flags are sent as 2 bytes instead of 1
    CLIENT_LONG_FLAG = 0x0000_0004, is_long_flag, set_long_flag;
    CLIENT_CONNECT_WITH_DB = 0x0000_0008, is_connect_with_db, set_connect_with_db;
    /// Reject `db.table.column` references
    CLIENT_NO_SCHEMA = 0x0000_0010, is_no_schema, set_no_schema;
    CLIENT_COMPRESS = 0x0000_0020, is_compress, set_compress;
    CLIENT_ODBC = 0x0000_0040, is_odbc, set_odbc;
    CLIENT_LOCAL_FILES = 0x0000_0080, is_local_files, set_local_files;
    CLIENT_IGNORE_SPACE = 0x0000_0100, is_ignore_space, set_ignore_space;
    CLIENT_PROTOCOL_41 = 0x0000_0200, is_protocol_41, set_protocol_41;
    CLIENT_INTERACTIVE = 0x0000_0400, is_interactive, set_interactive;
    /// Switch to TLS after the initial handshake
    CLIENT_SSL = 0x0000_0800, is_ssl, set_ssl;
    CLIENT_IGNORE_SIGPIPE = 0x0000_1000, is_ignore_sigpipe, set_ignore_sigpipe;
    CLIENT_TRANSACTIONS = 0x0000_2000, is_transactions, set_transactions;
    /// Old 4.1 protocol flag
    CLIENT_RESERVED = 0x0000_4000, is_reserved, set_reserved;
    /// Old 4.1 authentication, a.k.a. `CLIENT_RESERVED2`
    CLIENT_SECURE_CONNECTION = 0x0000_8000, is_secure_connection, set_secure_connection;
    CLIENT_MULTI_STATEMENTS = 0x0001_0000, is_multi_statements, set_multi_statements;
    CLIENT_MULTI_RESULTS = 0x0002_0000, is_multi_results, set_multi_results;
    CLIENT_PS_MULTI_RESULTS = 0x0004_0000, is_ps_multi_results, set_ps_multi_results;
    CLIENT_PLUGIN_AUTH = 0x0008_0000, is_plugin_auth, set_plugin_auth;
    CLIENT_CONNECT_ATTRS = 0x0010_0000, is_connect_attrs, set_connect_attrs;
    CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA = 0x0020_0000, is_plugin_auth_lenenc_client_data, set_plugin_auth_lenenc_client_data;
    CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS = 0x0040_0000, is_can_handle_expired_passwords, set_can_handle_expired_passwords;
    CLIENT_SESSION_TRACK = 0x0080_0000, is_session_track, set_session_track;
    /// OK packets replace EOF packets
    CLIENT_DEPRECATE_EOF = 0x0100_0000, is_deprecate_eof, set_deprecate_eof;
    CLIENT_OPTIONAL_RESULTSET_METADATA = 0x0200_0000, is_optional_resultset_metadata, set_optional_resultset_metadata;
    CLIENT_ZSTD_COMPRESSION_ALGORITHM = 0x0400_0000, is_zstd_compression_algorithm, set_zstd_compression_algorithm;
    CLIENT_QUERY_ATTRIBUTES = 0x0800_0000, is_query_attributes, set_query_attributes;
    CLIENT_MULTI_FACTOR_AUTHENTICATION = 0x1000_0000, is_multi_factor_authentication, set_multi_factor_authentication;
    CLIENT_CAPABILITY_EXTENSION = 0x2000_0000, is_capability_extension, set_capability_extension;
    CLIENT_SSL_VERIFY_SERVER_CERT = 0x4000_0000, is_ssl_verify_server_cert, set_ssl_verify_server_cert;
    CLIENT_REMEMBER_OPTIONS = 0x8000_0000, is_remember_options, set_remember_options;
}

impl CapabilityFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Assemble the flags from the two 16-bit halves sent in the initial handshake
    pub const fn from_halves(lower: u16, upper: u16) -> Self {
        Self(((upper as u32) << 16) | lower as u32)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Lower 16 bits, the part every protocol revision transmits
    pub const fn lower_2_bytes(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Upper 16 bits, only transmitted by protocol 4.1 handshakes
    pub const fn upper_2_bytes(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn contains(&self, other: CapabilityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersection(self, other: CapabilityFlags) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn union(self, other: CapabilityFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for CapabilityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitAnd for CapabilityFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl std::fmt::Display for CapabilityFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

// ─── Capability Tables ───────────────────────────────────────────────────────

/// Flags understood by pre-4.1 (protocol 320) servers
pub const CAPABILITIES_PROTOCOL_320: CapabilityFlags = CapabilityFlags(
    CapabilityFlags::CLIENT_LONG_PASSWORD.0
        | CapabilityFlags::CLIENT_FOUND_ROWS.0
        | CapabilityFlags::CLIENT_LONG_FLAG.0
        | CapabilityFlags::CLIENT_CONNECT_WITH_DB.0
        | CapabilityFlags::CLIENT_ODBC.0
        | CapabilityFlags::CLIENT_IGNORE_SPACE.0
        | CapabilityFlags::CLIENT_IGNORE_SIGPIPE.0
        | CapabilityFlags::CLIENT_TRANSACTIONS.0,
);

/// Protocol 4.1 request that keeps classic EOF packets
pub const CAPABILITIES_PROTOCOL_41_WITH_EOF: CapabilityFlags = CapabilityFlags(
    CAPABILITIES_PROTOCOL_320.0
        | CapabilityFlags::CLIENT_PROTOCOL_41.0
        | CapabilityFlags::CLIENT_SECURE_CONNECTION.0
        | CapabilityFlags::CLIENT_MULTI_STATEMENTS.0
        | CapabilityFlags::CLIENT_MULTI_RESULTS.0
        | CapabilityFlags::CLIENT_PS_MULTI_RESULTS.0
        | CapabilityFlags::CLIENT_PLUGIN_AUTH.0
        | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA.0
        | CapabilityFlags::CLIENT_SESSION_TRACK.0,
);

/// Default request of a protocol 4.1 backend connection
pub const CAPABILITIES_PROTOCOL_41: CapabilityFlags = CapabilityFlags(
    CAPABILITIES_PROTOCOL_41_WITH_EOF.0 | CapabilityFlags::CLIENT_DEPRECATE_EOF.0,
);

/// Requested on every backend connection regardless of options
pub const CAPABILITIES_ALWAYS_ENABLED: CapabilityFlags = CapabilityFlags(
    CapabilityFlags::CLIENT_LONG_PASSWORD.0
        | CapabilityFlags::CLIENT_LONG_FLAG.0
        | CapabilityFlags::CLIENT_PROTOCOL_41.0
        | CapabilityFlags::CLIENT_TRANSACTIONS.0
        | CapabilityFlags::CLIENT_SECURE_CONNECTION.0
        | CapabilityFlags::CLIENT_MULTI_RESULTS.0
        | CapabilityFlags::CLIENT_PS_MULTI_RESULTS.0
        | CapabilityFlags::CLIENT_PLUGIN_AUTH.0
        | CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA.0,
);

/// May be requested through `Opts::capabilities`
pub const CAPABILITIES_CONFIGURABLE: CapabilityFlags = CapabilityFlags(
    CapabilityFlags::CLIENT_FOUND_ROWS.0
        | CapabilityFlags::CLIENT_CONNECT_WITH_DB.0
        | CapabilityFlags::CLIENT_NO_SCHEMA.0
        | CapabilityFlags::CLIENT_ODBC.0
        | CapabilityFlags::CLIENT_IGNORE_SPACE.0
        | CapabilityFlags::CLIENT_IGNORE_SIGPIPE.0
        | CapabilityFlags::CLIENT_RESERVED.0
        | CapabilityFlags::CLIENT_MULTI_STATEMENTS.0
        | CapabilityFlags::CLIENT_CONNECT_ATTRS.0
        | CapabilityFlags::CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS.0
        | CapabilityFlags::CLIENT_SESSION_TRACK.0
        | CapabilityFlags::CLIENT_DEPRECATE_EOF.0,
);

/// Never requested by this crate
pub const CAPABILITIES_ALWAYS_DISABLED: CapabilityFlags = CapabilityFlags(
    CapabilityFlags::CLIENT_COMPRESS.0
        | CapabilityFlags::CLIENT_LOCAL_FILES.0
        | CapabilityFlags::CLIENT_INTERACTIVE.0
        | CapabilityFlags::CLIENT_SSL.0
        | CapabilityFlags::CLIENT_OPTIONAL_RESULTSET_METADATA.0
        | CapabilityFlags::CLIENT_ZSTD_COMPRESSION_ALGORITHM.0
        | CapabilityFlags::CLIENT_QUERY_ATTRIBUTES.0
        | CapabilityFlags::CLIENT_MULTI_FACTOR_AUTHENTICATION.0
        | CapabilityFlags::CLIENT_CAPABILITY_EXTENSION.0
        | CapabilityFlags::CLIENT_SSL_VERIFY_SERVER_CERT.0
        | CapabilityFlags::CLIENT_REMEMBER_OPTIONS.0,
);

bitflags! {
    /// Server status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServerStatusFlags: u16 {
        const SERVER_STATUS_IN_TRANS = 0x0001;
        const SERVER_STATUS_AUTOCOMMIT = 0x0002;
        const SERVER_MORE_RESULTS_EXISTS = 0x0008;
        const SERVER_STATUS_NO_GOOD_INDEX_USED = 0x0010;
        const SERVER_STATUS_NO_INDEX_USED = 0x0020;
        const SERVER_STATUS_CURSOR_EXISTS = 0x0040;
        const SERVER_STATUS_LAST_ROW_SENT = 0x0080;
        const SERVER_STATUS_DB_DROPPED = 0x0100;
        const SERVER_STATUS_NO_BACKSLASH_ESCAPES = 0x0200;
        const SERVER_STATUS_METADATA_CHANGED = 0x0400;
        const SERVER_QUERY_WAS_SLOW = 0x0800;
        const SERVER_PS_OUT_PARAMS = 0x1000;
        const SERVER_STATUS_IN_TRANS_READONLY = 0x2000;
        const SERVER_SESSION_STATE_CHANGED = 0x4000;
    }
}

bitflags! {
    /// Column definition flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnFlags: u16 {
        const NOT_NULL_FLAG = 0x0001;
        const PRI_KEY_FLAG = 0x0002;
        const UNIQUE_KEY_FLAG = 0x0004;
        const MULTIPLE_KEY_FLAG = 0x0008;
        const BLOB_FLAG = 0x0010;
        const UNSIGNED_FLAG = 0x0020;
        const ZEROFILL_FLAG = 0x0040;
        const BINARY_FLAG = 0x0080;
        const ENUM_FLAG = 0x0100;
        const AUTO_INCREMENT_FLAG = 0x0200;
        const TIMESTAMP_FLAG = 0x0400;
        const SET_FLAG = 0x0800;
        const NO_DEFAULT_VALUE_FLAG = 0x1000;
        const ON_UPDATE_NOW_FLAG = 0x2000;
        const PART_KEY_FLAG = 0x4000;
        const NUM_FLAG = 0x8000;
    }
}

/// MySQL column types
#[expect(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0x00,
    MYSQL_TYPE_TINY = 0x01,
    MYSQL_TYPE_SHORT = 0x02,
    MYSQL_TYPE_LONG = 0x03,
    MYSQL_TYPE_FLOAT = 0x04,
    MYSQL_TYPE_DOUBLE = 0x05,
    MYSQL_TYPE_NULL = 0x06,
    MYSQL_TYPE_TIMESTAMP = 0x07,
    MYSQL_TYPE_LONGLONG = 0x08,
    MYSQL_TYPE_INT24 = 0x09,
    MYSQL_TYPE_DATE = 0x0a,
    MYSQL_TYPE_TIME = 0x0b,
    MYSQL_TYPE_DATETIME = 0x0c,
    MYSQL_TYPE_YEAR = 0x0d,
    MYSQL_TYPE_NEWDATE = 0x0e,
    MYSQL_TYPE_VARCHAR = 0x0f,
    MYSQL_TYPE_BIT = 0x10,
    MYSQL_TYPE_TIMESTAMP2 = 0x11,
    MYSQL_TYPE_DATETIME2 = 0x12,
    MYSQL_TYPE_TIME2 = 0x13,
    MYSQL_TYPE_TYPED_ARRAY = 0x14,
    MYSQL_TYPE_JSON = 0xf5,
    MYSQL_TYPE_NEWDECIMAL = 0xf6,
    MYSQL_TYPE_ENUM = 0xf7,
    MYSQL_TYPE_SET = 0xf8,
    MYSQL_TYPE_TINY_BLOB = 0xf9,
    MYSQL_TYPE_MEDIUM_BLOB = 0xfa,
    MYSQL_TYPE_LONG_BLOB = 0xfb,
    MYSQL_TYPE_BLOB = 0xfc,
    MYSQL_TYPE_VAR_STRING = 0xfd,
    MYSQL_TYPE_STRING = 0xfe,
    MYSQL_TYPE_GEOMETRY = 0xff,
}

impl ColumnType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::MYSQL_TYPE_DECIMAL),
            0x01 => Some(Self::MYSQL_TYPE_TINY),
            0x02 => Some(Self::MYSQL_TYPE_SHORT),
            0x03 => Some(Self::MYSQL_TYPE_LONG),
            0x04 => Some(Self::MYSQL_TYPE_FLOAT),
            0x05 => Some(Self::MYSQL_TYPE_DOUBLE),
            0x06 => Some(Self::MYSQL_TYPE_NULL),
            0x07 => Some(Self::MYSQL_TYPE_TIMESTAMP),
            0x08 => Some(Self::MYSQL_TYPE_LONGLONG),
            0x09 => Some(Self::MYSQL_TYPE_INT24),
            0x0a => Some(Self::MYSQL_TYPE_DATE),
            0x0b => Some(Self::MYSQL_TYPE_TIME),
            0x0c => Some(Self::MYSQL_TYPE_DATETIME),
            0x0d => Some(Self::MYSQL_TYPE_YEAR),
            0x0e => Some(Self::MYSQL_TYPE_NEWDATE),
            0x0f => Some(Self::MYSQL_TYPE_VARCHAR),
            0x10 => Some(Self::MYSQL_TYPE_BIT),
            0x11 => Some(Self::MYSQL_TYPE_TIMESTAMP2),
            0x12 => Some(Self::MYSQL_TYPE_DATETIME2),
            0x13 => Some(Self::MYSQL_TYPE_TIME2),
            0x14 => Some(Self::MYSQL_TYPE_TYPED_ARRAY),
            0xf5 => Some(Self::MYSQL_TYPE_JSON),
            0xf6 => Some(Self::MYSQL_TYPE_NEWDECIMAL),
            0xf7 => Some(Self::MYSQL_TYPE_ENUM),
            0xf8 => Some(Self::MYSQL_TYPE_SET),
            0xf9 => Some(Self::MYSQL_TYPE_TINY_BLOB),
            0xfa => Some(Self::MYSQL_TYPE_MEDIUM_BLOB),
            0xfb => Some(Self::MYSQL_TYPE_LONG_BLOB),
            0xfc => Some(Self::MYSQL_TYPE_BLOB),
            0xfd => Some(Self::MYSQL_TYPE_VAR_STRING),
            0xfe => Some(Self::MYSQL_TYPE_STRING),
            0xff => Some(Self::MYSQL_TYPE_GEOMETRY),
            _ => None,
        }
    }

    /// Integer types decoded as `SignedInt`/`UnsignedInt`
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::MYSQL_TYPE_TINY
                | Self::MYSQL_TYPE_SHORT
                | Self::MYSQL_TYPE_INT24
                | Self::MYSQL_TYPE_LONG
                | Self::MYSQL_TYPE_LONGLONG
                | Self::MYSQL_TYPE_YEAR
        )
    }
}
