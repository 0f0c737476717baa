//! Request validation.
//!
//! Every request kind has an ordered chain of checks. The first check that
//! fails decides the error; later checks are not evaluated. Validation never
//! mutates the registry.

use lockbox_core::{Filename, Identity, Request};

use crate::error::ValidationError;
use crate::registry::AccessRegistry;

type Check = std::result::Result<(), ValidationError>;

/// Decide whether `sender` may perform `request` against `registry`.
pub fn validate(sender: &Identity, request: &Request, registry: &AccessRegistry) -> Check {
    match request {
        Request::AddUser => {
            if registry.is_user(sender) {
                return Err(ValidationError::UserExists(sender.clone()));
            }
            Ok(())
        }

        Request::UploadFile { filename, data } => {
            known_user(sender, registry)?;
            well_formed(filename)?;
            if registry.has_file(filename) {
                return Err(ValidationError::FileExists(filename.clone()));
            }
            if data.is_empty() {
                return Err(ValidationError::EmptyData);
            }
            Ok(())
        }

        Request::DownloadFile { filename } => {
            known_user(sender, registry)?;
            existing_file(filename, registry)?;
            if !registry.is_authorized_read(sender, filename) {
                return Err(unauthorized(sender, "download", filename));
            }
            Ok(())
        }

        Request::DeleteFile { filename } => {
            known_user(sender, registry)?;
            existing_file(filename, registry)?;
            if !registry.is_owner(sender, filename) {
                return Err(unauthorized(sender, "delete", filename));
            }
            Ok(())
        }

        Request::ShareFile { filename, target } => {
            known_user(sender, registry)?;
            if !registry.is_user(target) {
                return Err(ValidationError::UnknownTarget(target.clone()));
            }
            existing_file(filename, registry)?;
            if !registry.is_owner(sender, filename) {
                return Err(unauthorized(sender, "share", filename));
            }
            if registry.is_authorized_read(target, filename) {
                return Err(ValidationError::AlreadyShared {
                    user: target.clone(),
                    filename: filename.clone(),
                });
            }
            Ok(())
        }

        Request::Unrecognized { header } => {
            Err(ValidationError::UnrecognizedOperation(header.clone()))
        }
    }
}

fn known_user(user: &Identity, registry: &AccessRegistry) -> Check {
    if !registry.is_user(user) {
        return Err(ValidationError::UnknownUser(user.clone()));
    }
    Ok(())
}

/// Non-empty, then a single plain path component.
fn well_formed(filename: &Filename) -> Check {
    if filename.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    if !filename.is_plain() {
        return Err(ValidationError::InvalidFilename(filename.clone()));
    }
    Ok(())
}

fn existing_file(filename: &Filename, registry: &AccessRegistry) -> Check {
    well_formed(filename)?;
    if !registry.has_file(filename) {
        return Err(ValidationError::FileNotFound(filename.clone()));
    }
    Ok(())
}

fn unauthorized(user: &Identity, action: &'static str, filename: &Filename) -> ValidationError {
    ValidationError::Unauthorized {
        user: user.clone(),
        action,
        filename: filename.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn file(name: &str) -> Filename {
        Filename::new(name)
    }

    fn upload(name: &str, data: &'static [u8]) -> Request {
        Request::UploadFile {
            filename: file(name),
            data: Bytes::from_static(data),
        }
    }

    fn share(name: &str, target: &str) -> Request {
        Request::ShareFile {
            filename: file(name),
            target: id(target),
        }
    }

    /// alice and bob exist; alice owns notes.txt.
    fn registry() -> AccessRegistry {
        let mut registry = AccessRegistry::new();
        registry.add_user(id("alice"));
        registry.add_user(id("bob"));
        registry.record_upload(id("alice"), file("notes.txt"));
        registry
    }

    fn error_text(sender: &str, request: &Request, registry: &AccessRegistry) -> String {
        validate(&id(sender), request, registry)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_add_user() {
        let registry = registry();
        assert!(validate(&id("carol"), &Request::AddUser, &registry).is_ok());
        assert_eq!(
            error_text("alice", &Request::AddUser, &registry),
            "user alice already exists"
        );
    }

    #[test]
    fn test_upload_chain() {
        let registry = registry();

        assert!(validate(&id("bob"), &upload("b.txt", b"x"), &registry).is_ok());
        assert_eq!(
            error_text("carol", &upload("b.txt", b"x"), &registry),
            "user carol doesn't exist"
        );
        assert_eq!(
            error_text("bob", &upload("", b"x"), &registry),
            "filename is empty"
        );
        assert_eq!(
            error_text("bob", &upload("../etc/passwd", b"x"), &registry),
            "filename ../etc/passwd is not a plain file name"
        );
        assert_eq!(
            error_text("bob", &upload("notes.txt", b"x"), &registry),
            "file notes.txt already exists"
        );
        assert_eq!(
            error_text("bob", &upload("b.txt", b""), &registry),
            "data is empty"
        );
    }

    #[test]
    fn test_download_chain() {
        let registry = registry();
        let download = |name: &str| Request::DownloadFile {
            filename: file(name),
        };

        assert!(validate(&id("alice"), &download("notes.txt"), &registry).is_ok());
        assert_eq!(
            error_text("bob", &download("missing"), &registry),
            "file missing does not exist"
        );
        assert_eq!(
            error_text("bob", &download("notes.txt"), &registry),
            "user bob is unauthorized to download file notes.txt"
        );
    }

    #[test]
    fn test_delete_requires_owner() {
        let mut registry = registry();
        registry.record_share(&file("notes.txt"), id("bob"));
        let delete = Request::DeleteFile {
            filename: file("notes.txt"),
        };

        assert!(validate(&id("alice"), &delete, &registry).is_ok());
        assert_eq!(
            error_text("bob", &delete, &registry),
            "user bob is unauthorized to delete file notes.txt"
        );
    }

    #[test]
    fn test_share_chain() {
        let mut registry = registry();
        registry.add_user(id("carol"));

        assert!(validate(&id("alice"), &share("notes.txt", "bob"), &registry).is_ok());
        assert_eq!(
            error_text("alice", &share("notes.txt", "dave"), &registry),
            "target user dave doesn't exist"
        );
        assert_eq!(
            error_text("alice", &share("", "bob"), &registry),
            "filename is empty"
        );
        assert_eq!(
            error_text("alice", &share("missing", "bob"), &registry),
            "file missing does not exist"
        );
        assert_eq!(
            error_text("bob", &share("notes.txt", "carol"), &registry),
            "user bob is unauthorized to share file notes.txt"
        );
        assert_eq!(
            error_text("alice", &share("notes.txt", "alice"), &registry),
            "user alice already has read access to file notes.txt"
        );

        registry.record_share(&file("notes.txt"), id("bob"));
        assert_eq!(
            error_text("alice", &share("notes.txt", "bob"), &registry),
            "user bob already has read access to file notes.txt"
        );
    }

    #[test]
    fn test_unrecognized_operation() {
        let request = Request::Unrecognized {
            header: "format_disk".into(),
        };
        assert_eq!(
            error_text("alice", &request, &registry()),
            "unrecognized operation: format_disk"
        );
    }

    #[test]
    fn test_first_failure_wins() {
        let registry = registry();

        // Unknown sender and empty filename: only the sender is reported.
        assert_eq!(
            validate(&id("mallory"), &upload("", b""), &registry),
            Err(ValidationError::UnknownUser(id("mallory")))
        );

        // Unknown target is checked before the filename.
        assert_eq!(
            validate(&id("alice"), &share("", "dave"), &registry),
            Err(ValidationError::UnknownTarget(id("dave")))
        );

        // Existing file is reported before empty data.
        assert_eq!(
            validate(&id("bob"), &upload("notes.txt", b""), &registry),
            Err(ValidationError::FileExists(file("notes.txt")))
        );
    }

    #[test]
    fn test_validation_never_mutates() {
        let registry = registry();
        let before = registry.clone();

        let _ = validate(&id("bob"), &share("notes.txt", "alice"), &registry);
        let _ = validate(&id("carol"), &Request::AddUser, &registry);

        assert_eq!(registry, before);
    }
}
