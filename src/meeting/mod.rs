//! Meeting descriptors produced by the recordings listing.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in display keys, e.g. `01:03:2024 10:00:00`.
pub const DISPLAY_TIME_FORMAT: &str = "%d:%m:%Y %H:%M:%S";

const MAX_TOPIC_FILENAME_LEN: usize = 60;

/// A finished cloud recording, as listed by Zoom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDescriptor {
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub download_url: String,
    pub recording_id: String,
    pub meeting_uuid: String,
    pub file_extension: String,
    pub file_size: Option<u64>,
}

impl MeetingDescriptor {
    /// Human readable key, `<start time in tz> - <topic>`.
    ///
    /// Index files written before recording ids were stored are keyed by this
    /// string, so the layout must not change.
    pub fn display_key(&self, tz: Tz) -> String {
        format!(
            "{} - {}",
            self.start_time.with_timezone(&tz).format(DISPLAY_TIME_FORMAT),
            self.topic
        )
    }

    /// Name of the local file this recording is downloaded to.
    pub fn artifact_file_name(&self) -> String {
        let topic: String = sanitize(&self.topic)
            .chars()
            .take(MAX_TOPIC_FILENAME_LEN)
            .collect();
        let extension = match sanitize(&self.file_extension).to_lowercase() {
            ext if ext.is_empty() => "mp4".to_string(),
            ext => ext,
        };
        format!(
            "{}_{}_{}.{}",
            self.start_time.format("%Y-%m-%d_%H-%M-%S"),
            topic,
            sanitize(&self.recording_id),
            extension
        )
    }
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_alphanumeric() || c == '-' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekly_sync() -> MeetingDescriptor {
        MeetingDescriptor {
            topic: "Weekly Sync".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap(),
            download_url: "https://zoom.us/rec/download/abc".to_string(),
            recording_id: "rec-1".to_string(),
            meeting_uuid: "uuid==".to_string(),
            file_extension: "MP4".to_string(),
            file_size: None,
        }
    }

    #[test]
    fn test_display_key_converts_to_display_timezone() {
        assert_eq!(
            weekly_sync().display_key(chrono_tz::Europe::Moscow),
            "01:03:2024 10:00:00 - Weekly Sync"
        );
        assert_eq!(
            weekly_sync().display_key(chrono_tz::UTC),
            "01:03:2024 07:00:00 - Weekly Sync"
        );
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(
            weekly_sync().artifact_file_name(),
            "2024-03-01_07-00-00_Weekly_Sync_rec-1.mp4"
        );
    }

    #[test]
    fn test_artifact_file_name_strips_path_characters() {
        let mut meeting = weekly_sync();
        meeting.topic = "../../etc/passwd".to_string();
        meeting.recording_id = "a/b".to_string();
        let name = meeting.artifact_file_name();
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
    }

    #[test]
    fn test_artifact_file_name_defaults_extension() {
        let mut meeting = weekly_sync();
        meeting.file_extension = String::new();
        assert!(meeting.artifact_file_name().ends_with(".mp4"));
    }
}
