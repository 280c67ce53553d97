//! ArFS tag vocabulary and the small enums parsed out of tag values.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

pub const APP_NAME: &str = "App-Name";
pub const APP_VERSION: &str = "App-Version";
pub const ARFS: &str = "ArFS";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const DRIVE_ID: &str = "Drive-Id";
pub const ENTITY_TYPE: &str = "Entity-Type";
pub const UNIX_TIME: &str = "Unix-Time";
pub const FOLDER_ID: &str = "Folder-Id";
pub const FILE_ID: &str = "File-Id";
pub const PARENT_FOLDER_ID: &str = "Parent-Folder-Id";
pub const DRIVE_PRIVACY: &str = "Drive-Privacy";
pub const CIPHER: &str = "Cipher";
pub const CIPHER_IV: &str = "Cipher-IV";
pub const DRIVE_AUTH_MODE: &str = "Drive-Auth-Mode";

/// Every tag name the entity builder understands. Anything else is passed
/// through on the entity as a custom tag.
pub const KNOWN_TAGS: &[&str] = &[
    APP_NAME,
    APP_VERSION,
    ARFS,
    CONTENT_TYPE,
    DRIVE_ID,
    ENTITY_TYPE,
    UNIX_TIME,
    FOLDER_ID,
    FILE_ID,
    PARENT_FOLDER_ID,
    DRIVE_PRIVACY,
    CIPHER,
    CIPHER_IV,
    DRIVE_AUTH_MODE,
];

/// One name/value tag on a ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GqlTag {
    pub name: String,
    pub value: String,
}

impl GqlTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_known(&self) -> bool {
        KNOWN_TAGS.contains(&self.name.as_str())
    }
}

/// Error returned when a tag value is outside its vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {tag} value: {value}")]
pub struct UnknownTagValue {
    pub tag: &'static str,
    pub value: String,
}

/// Declares a closed string-valued tag enum with `Display`/`FromStr`.
macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident, $tag:expr, { $($variant:ident => $text:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownTagValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownTagValue { tag: $tag, value: s.to_string() }),
                }
            }
        }
    };
}

tag_enum!(
    /// Kind of entity a record describes.
    EntityType, ENTITY_TYPE, {
        Drive => "drive",
        Folder => "folder",
        File => "file",
    }
);

tag_enum!(
    /// Drive visibility.
    DrivePrivacy, DRIVE_PRIVACY, {
        Public => "public",
        Private => "private",
    }
);

tag_enum!(
    /// How a private drive's key is derived.
    DriveAuthMode, DRIVE_AUTH_MODE, {
        Password => "password",
    }
);

tag_enum!(
    /// Symmetric cipher protecting a private record's body.
    Cipher, CIPHER, {
        Aes256Gcm => "AES256-GCM",
    }
);

/// Content type of public metadata bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Content type of encrypted metadata bodies.
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";
