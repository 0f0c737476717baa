//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use lockbox_core::{Filename, Identity, Request};
use lockbox_perms::IdentityKeys;

/// Generate random identity keys.
pub fn identity_keys() -> impl Strategy<Value = IdentityKeys> {
    any::<[u8; 32]>().prop_map(|seed| IdentityKeys::from_seed(&seed))
}

/// Generate a valid identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    "[a-z][a-z0-9_-]{0,15}".prop_filter_map("valid identity", |s| Identity::new(s).ok())
}

/// Generate one of a small pool of identities, so that requests collide.
pub fn pooled_identity(pool: &'static [&'static str]) -> impl Strategy<Value = Identity> {
    prop::sample::select(pool).prop_filter_map("valid identity", |s| Identity::new(s).ok())
}

/// Generate a plain file name.
pub fn filename() -> impl Strategy<Value = Filename> {
    "[A-Za-z0-9_-][A-Za-z0-9._-]{0,31}".prop_map(Filename::new)
}

/// Generate non-empty file contents of at most `max_len` bytes.
pub fn file_data(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1)).prop_map(Bytes::from)
}

/// Generate any request over a small pool of users and file names.
///
/// Includes invalid shapes (empty names, empty data, path-like names) so
/// validation gets exercised along with the happy paths.
pub fn request(users: &'static [&'static str]) -> impl Strategy<Value = Request> {
    let data = prop_oneof![
        4 => file_data(64),
        1 => Just(Bytes::new()),
    ];

    prop_oneof![
        Just(Request::AddUser),
        (script_filename(), data)
            .prop_map(|(filename, data)| Request::UploadFile { filename, data }),
        script_filename().prop_map(|filename| Request::DownloadFile { filename }),
        script_filename().prop_map(|filename| Request::DeleteFile { filename }),
        (script_filename(), pooled_identity(users))
            .prop_map(|(filename, target)| Request::ShareFile { filename, target }),
    ]
}

const SCRIPT_FILENAMES: &[&str] = &["a.txt", "b.txt", "c.txt"];

/// Mostly colliding names, with the occasional invalid one.
fn script_filename() -> impl Strategy<Value = Filename> {
    prop_oneof![
        4 => prop::sample::select(SCRIPT_FILENAMES).prop_map(Filename::new),
        1 => Just(Filename::new("")),
        1 => Just(Filename::new("../escape")),
    ]
}

/// Generate a sequence of `(sender, request)` pairs over a shared pool.
pub fn request_script(
    users: &'static [&'static str],
    max_len: usize,
) -> impl Strategy<Value = Vec<(Identity, Request)>> {
    prop::collection::vec((pooled_identity(users), request(users)), 0..=max_len)
}
