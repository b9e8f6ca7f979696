//! Cloud recordings listing.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{AccessToken, ZoomClient, ZoomError};
use crate::config::ListingConfig;
use crate::meeting::MeetingDescriptor;
use crate::project::Project;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What to do when Zoom reports no recordings in range.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyListingPolicy {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&ListingConfig> for EmptyListingPolicy {
    fn from(config: &ListingConfig) -> Self {
        Self {
            retry_attempts: config.empty_retry_attempts,
            retry_delay: config.empty_retry_delay(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordingsPage {
    #[serde(default)]
    meetings: Vec<RecordedMeeting>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordedMeeting {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    topic: String,
    start_time: DateTime<Utc>,
    #[serde(default)]
    recording_files: Vec<RecordingFile>,
}

#[derive(Debug, Deserialize)]
struct RecordingFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    file_extension: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl RecordingFile {
    fn is_finished_video(&self) -> bool {
        let is_mp4 = self
            .file_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("MP4"));
        let completed = self
            .status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("completed"));
        is_mp4 && completed && self.download_url.is_some() && self.id.is_some()
    }
}

impl RecordedMeeting {
    /// Uses the first finished MP4 file; meetings still processing are skipped.
    fn into_descriptor(self) -> Option<MeetingDescriptor> {
        let file = self
            .recording_files
            .into_iter()
            .find(RecordingFile::is_finished_video)?;
        Some(MeetingDescriptor {
            topic: self.topic,
            start_time: self.start_time,
            download_url: file.download_url?,
            recording_id: file.id?,
            meeting_uuid: self.uuid,
            file_extension: file.file_extension.unwrap_or_else(|| "mp4".to_string()),
            file_size: file.file_size,
        })
    }
}

impl ZoomClient {
    /// Lists finished recordings between `from` and `to` (inclusive), in the
    /// order Zoom returns them.
    ///
    /// An empty vector means there is nothing to show yet. Transport errors,
    /// timeouts and non-success statuses are [`ZoomError::Listing`].
    pub async fn list_recordings(
        &self,
        project: &Project,
        token: &AccessToken,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MeetingDescriptor>, ZoomError> {
        let url = format!(
            "{}/users/me/recordings",
            self.config.api_base_url.trim_end_matches('/')
        );
        let from = from.format(DATE_FORMAT).to_string();
        let to = to.format(DATE_FORMAT).to_string();
        let page_size = self.page_size.to_string();

        let mut meetings = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("page_size", page_size.as_str()),
            ];
            if let Some(page) = next_page_token.as_deref() {
                query.push(("next_page_token", page));
            }

            let response = self
                .client
                .get(&url)
                .query(&query)
                .bearer_auth(token.bearer())
                .timeout(self.config.request_timeout())
                .send()
                .await
                .map_err(|e| ZoomError::listing(&project.name, e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Zoom recordings request for {} failed with status {}: {}",
                    project.name, status, body
                );
                return Err(ZoomError::Listing {
                    project: project.name.clone(),
                    status: Some(status),
                    message: format!("recordings endpoint returned {}", status),
                });
            }

            let page: RecordingsPage = response
                .json()
                .await
                .map_err(|e| ZoomError::listing(&project.name, e))?;

            debug!(
                "Zoom returned {} meeting(s) for {}",
                page.meetings.len(),
                project.name
            );

            meetings.extend(
                page.meetings
                    .into_iter()
                    .filter_map(RecordedMeeting::into_descriptor),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        info!(
            "Found {} finished recording(s) for {} between {} and {}",
            meetings.len(),
            project.name,
            from,
            to
        );

        Ok(meetings)
    }

    /// Authenticates and lists recordings, re-polling an empty listing as the
    /// policy allows. Each attempt fetches a fresh token.
    pub async fn fetch_recordings(
        &self,
        project: &Project,
        from: NaiveDate,
        to: NaiveDate,
        policy: EmptyListingPolicy,
    ) -> Result<Vec<MeetingDescriptor>, ZoomError> {
        let mut attempt = 0;
        loop {
            let token = self.get_access_token(project).await?;
            let meetings = self.list_recordings(project, &token, from, to).await?;
            if !meetings.is_empty() || attempt >= policy.retry_attempts {
                return Ok(meetings);
            }

            attempt += 1;
            info!(
                "No recordings for {} yet, polling again in {}s ({}/{})",
                project.name,
                policy.retry_delay.as_secs(),
                attempt,
                policy.retry_attempts
            );
            sleep(policy.retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoomConfig;
    use chrono::TimeZone;
    use mockito::Matcher;
    use std::path::PathBuf;

    fn project() -> Project {
        Project::fixture("Krauz", PathBuf::from("/tmp/krauz.jsonl"))
    }

    fn client_for(oauth_url: String, api_base_url: String, timeout_secs: u64) -> ZoomClient {
        ZoomClient::new(ZoomConfig {
            oauth_url,
            api_base_url,
            request_timeout_secs: timeout_secs,
        })
        .unwrap()
    }

    fn client(server: &mockito::Server) -> ZoomClient {
        client_for(
            format!("{}/oauth/token", server.url()),
            format!("{}/v2", server.url()),
            5,
        )
    }

    fn token() -> AccessToken {
        AccessToken {
            value: secrecy::Secret::new("tok".to_string()),
            obtained_at: Utc::now(),
            expires_in: Duration::from_secs(3600),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn listing_body() -> String {
        serde_json::json!({
            "from": "2024-03-01",
            "to": "2024-03-31",
            "page_size": 300,
            "next_page_token": "",
            "meetings": [
                {
                    "uuid": "u1==",
                    "id": 111,
                    "topic": "Weekly Sync",
                    "start_time": "2024-03-01T07:00:00Z",
                    "recording_files": [
                        {
                            "id": "audio-1",
                            "file_type": "M4A",
                            "file_extension": "M4A",
                            "download_url": "https://zoom.us/rec/download/audio-1",
                            "status": "completed"
                        },
                        {
                            "id": "video-1",
                            "file_type": "MP4",
                            "file_extension": "MP4",
                            "file_size": 2048,
                            "download_url": "https://zoom.us/rec/download/video-1",
                            "status": "completed"
                        }
                    ]
                },
                {
                    "uuid": "u2==",
                    "id": 222,
                    "topic": "Still processing",
                    "start_time": "2024-03-02T07:00:00Z",
                    "recording_files": [
                        {
                            "id": "video-2",
                            "file_type": "MP4",
                            "download_url": "https://zoom.us/rec/download/video-2",
                            "status": "processing"
                        }
                    ]
                }
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_list_recordings_selects_finished_video() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".into(), "2024-03-01".into()),
                Matcher::UrlEncoded("to".into(), "2024-03-31".into()),
            ]))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(listing_body())
            .create_async()
            .await;

        let meetings = client(&server)
            .list_recordings(&project(), &token(), day(2024, 3, 1), day(2024, 3, 31))
            .await
            .unwrap();

        assert_eq!(meetings.len(), 1);
        let meeting = &meetings[0];
        assert_eq!(meeting.topic, "Weekly Sync");
        assert_eq!(
            meeting.start_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
        );
        assert_eq!(meeting.recording_id, "video-1");
        assert_eq!(meeting.file_size, Some(2048));
        assert_eq!(meeting.download_url, "https://zoom.us/rec/download/video-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_recordings_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        // The first page carries no page token, so its query ends at page_size.
        let first = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::Regex("page_size=300$".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "next_page_token": "page-2",
                    "meetings": [{
                        "uuid": "a", "topic": "First", "start_time": "2024-03-05T07:00:00Z",
                        "recording_files": [{"id": "v-a", "file_type": "MP4",
                            "download_url": "https://zoom.us/a", "status": "completed"}]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::UrlEncoded("next_page_token".into(), "page-2".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "next_page_token": "",
                    "meetings": [{
                        "uuid": "b", "topic": "Second", "start_time": "2024-03-04T07:00:00Z",
                        "recording_files": [{"id": "v-b", "file_type": "MP4",
                            "download_url": "https://zoom.us/b", "status": "completed"}]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let meetings = client(&server)
            .list_recordings(&project(), &token(), day(2024, 3, 1), day(2024, 3, 31))
            .await
            .unwrap();

        let topics: Vec<_> = meetings.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(topics, vec!["First", "Second"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"from":"2024-03-01","to":"2024-03-31","meetings":[]}"#)
            .create_async()
            .await;

        let meetings = client(&server)
            .list_recordings(&project(), &token(), day(2024, 3, 1), day(2024, 3, 31))
            .await
            .unwrap();
        assert!(meetings.is_empty());
    }

    #[tokio::test]
    async fn test_listing_rejected_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server)
            .list_recordings(&project(), &token(), day(2024, 3, 1), day(2024, 3, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, ZoomError::Listing { .. }));
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_listing_timeout_is_an_error() {
        // Accepts connections (via the backlog) but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = client_for(
            format!("http://{}/oauth/token", addr),
            format!("http://{}/v2", addr),
            1,
        );

        let err = client
            .list_recordings(&project(), &token(), day(2024, 3, 1), day(2024, 3, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, ZoomError::Listing { status: None, .. }));
        drop(listener);
    }

    #[tokio::test]
    async fn test_fetch_recordings_repolls_empty_listing() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
            .expect(3)
            .create_async()
            .await;
        let list_mock = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"meetings":[]}"#)
            .expect(3)
            .create_async()
            .await;

        let policy = EmptyListingPolicy {
            retry_attempts: 2,
            retry_delay: Duration::from_millis(10),
        };
        let meetings = client(&server)
            .fetch_recordings(&project(), day(2024, 3, 1), day(2024, 3, 31), policy)
            .await
            .unwrap();

        assert!(meetings.is_empty());
        token_mock.assert_async().await;
        list_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_recordings_surfaces_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .create_async()
            .await;
        let list_mock = server
            .mock("GET", "/v2/users/me/recordings")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client(&server)
            .fetch_recordings(
                &project(),
                day(2024, 3, 1),
                day(2024, 3, 31),
                EmptyListingPolicy::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ZoomError::Auth { .. }));
        list_mock.assert_async().await;
    }
}
