use thiserror::Error;

pub const PREDICT_ENDPOINT: &str = "/predict";
pub const FILE_FIELD: &str = "file";

/// What the panel needs to know about a picked or dropped file.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub mime: String,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadRejected {
    #[error("{name} is not an image (type `{mime}`)")]
    NotAnImage { name: String, mime: String },
}

pub fn validate_file(file: &SelectedFile) -> Result<(), UploadRejected> {
    if file.mime.starts_with("image/") {
        Ok(())
    } else {
        Err(UploadRejected::NotAnImage {
            name: file.name.clone(),
            mime: file.mime.clone(),
        })
    }
}

/// Identifies one submission. Tickets only grow, so the latest one is the
/// largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTicket(pub u64);

/// Tracks the single upload whose outcome the panel will accept.
#[derive(Debug, Default)]
pub struct UploadTracker {
    issued: u64,
    in_flight: Option<UploadTicket>,
}

impl UploadTracker {
    /// Issues a new ticket and returns the one it supersedes, if any.
    pub fn begin(&mut self) -> (UploadTicket, Option<UploadTicket>) {
        self.issued += 1;
        let ticket = UploadTicket(self.issued);
        let superseded = self.in_flight.replace(ticket);
        (ticket, superseded)
    }

    /// Returns true when `ticket` is the upload in flight, and clears it.
    pub fn settle(&mut self, ticket: UploadTicket) -> bool {
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    pub fn in_flight(&self) -> Option<UploadTicket> {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_any_image_subtype() {
        for mime in ["image/png", "image/jpeg", "image/webp", "image/svg+xml"] {
            assert!(validate_file(&SelectedFile::new("a", mime)).is_ok(), "{}", mime);
        }
    }

    #[test]
    fn test_validate_rejects_non_images() {
        for mime in ["", "text/plain", "application/pdf", "video/mp4", "IMAGE/PNG"] {
            let err = validate_file(&SelectedFile::new("notes", mime)).unwrap_err();
            assert!(matches!(err, UploadRejected::NotAnImage { .. }), "{}", mime);
        }
    }

    #[test]
    fn test_tracker_supersedes_previous_ticket() {
        let mut tracker = UploadTracker::default();

        let (first, superseded) = tracker.begin();
        assert_eq!(superseded, None);

        let (second, superseded) = tracker.begin();
        assert_eq!(superseded, Some(first));
        assert!(second > first);

        assert!(!tracker.settle(first));
        assert_eq!(tracker.in_flight(), Some(second));
        assert!(tracker.settle(second));
        assert_eq!(tracker.in_flight(), None);
        assert!(!tracker.settle(second));
    }
}
