use super::*;
use chrono::TimeZone;
use std::path::PathBuf;
use std::sync::Arc;

fn setup() -> (tempfile::TempDir, Project, DeliveryIndex) {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::fixture("Krauz", dir.path().join("index").join("krauz.jsonl"));
    (dir, project, DeliveryIndex::new(chrono_tz::Europe::Moscow))
}

fn weekly_sync() -> MeetingDescriptor {
    MeetingDescriptor {
        topic: "Weekly Sync".to_string(),
        start_time: Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap(),
        download_url: "https://zoom.us/rec/download/video-1".to_string(),
        recording_id: "video-1".to_string(),
        meeting_uuid: "u1==".to_string(),
        file_extension: "MP4".to_string(),
        file_size: None,
    }
}

fn write_file(path: &PathBuf, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_lookup_legacy_file() {
    let (_dir, project, index) = setup();
    write_file(
        &project.index_file,
        r#"{"01:03:2024 10:00:00 - Weekly Sync": [101, 102], "other": [5]}"#,
    );

    let refs = index
        .lookup(&project, "01:03:2024 10:00:00 - Weekly Sync")
        .await;
    assert_eq!(refs, vec![MessageRef(101), MessageRef(102)]);

    let refs = index.lookup_meeting(&project, &weekly_sync()).await;
    assert_eq!(refs, vec![MessageRef(101), MessageRef(102)]);
}

#[tokio::test]
async fn test_lookup_absent_key_is_empty() {
    let (_dir, project, index) = setup();
    write_file(&project.index_file, r#"{"known": [1]}"#);

    assert!(index.lookup(&project, "unknown").await.is_empty());
    // Deterministic for fixed content.
    assert_eq!(
        index.lookup(&project, "known").await,
        index.lookup(&project, "known").await
    );
}

#[tokio::test]
async fn test_missing_file_is_empty() {
    let (_dir, project, index) = setup();
    assert!(index.lookup_meeting(&project, &weekly_sync()).await.is_empty());
    assert!(index.entries(&project).await.is_empty());
}

#[tokio::test]
async fn test_malformed_file_is_empty() {
    let (_dir, project, index) = setup();
    write_file(&project.index_file, "{ this is not json");

    assert!(index.lookup_meeting(&project, &weekly_sync()).await.is_empty());
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let (_dir, project, index) = setup();
    write_file(
        &project.index_file,
        concat!(
            r#"{"key":"a","recording_id":"video-1","message_id":10}"#,
            "\n",
            "garbage\n",
            r#"{"key":"b","recording_id":"video-1","message_id":11}"#,
            "\n"
        ),
    );

    let refs = index.lookup_meeting(&project, &weekly_sync()).await;
    assert_eq!(refs, vec![MessageRef(10), MessageRef(11)]);
}

#[tokio::test]
async fn test_recording_id_survives_display_drift() {
    let (_dir, project, index) = setup();
    index
        .record(&project, &weekly_sync(), MessageRef(300))
        .await
        .unwrap();

    // Same recording, topic renamed afterwards: the display key no longer
    // matches but the recording id does.
    let mut renamed = weekly_sync();
    renamed.topic = "Weekly Sync (renamed)".to_string();
    assert_eq!(
        index.lookup_meeting(&project, &renamed).await,
        vec![MessageRef(300)]
    );

    // A different recording with an identical display key is not a match.
    let mut other = weekly_sync();
    other.recording_id = "video-2".to_string();
    assert!(index.lookup_meeting(&project, &other).await.is_empty());
}

#[tokio::test]
async fn test_record_appends_and_deduplicates() {
    let (_dir, project, index) = setup();
    let meeting = weekly_sync();

    assert!(index.record(&project, &meeting, MessageRef(1)).await.unwrap());
    assert!(!index.record(&project, &meeting, MessageRef(1)).await.unwrap());
    assert!(index.record(&project, &meeting, MessageRef(2)).await.unwrap());

    let entries = index.entries(&project).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, "01:03:2024 10:00:00 - Weekly Sync");
    assert_eq!(entries[0].recording_id.as_deref(), Some("video-1"));
    assert!(entries[0].recorded_at.is_some());

    let content = std::fs::read_to_string(&project.index_file).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[tokio::test]
async fn test_record_migrates_legacy_file() {
    let (_dir, project, index) = setup();
    write_file(
        &project.index_file,
        r#"{"01:03:2024 10:00:00 - Weekly Sync": [101], "02:03:2024 09:00:00 - Retro": [7, 8]}"#,
    );

    // Already present under the legacy display key.
    assert!(!index
        .record(&project, &weekly_sync(), MessageRef(101))
        .await
        .unwrap());
    assert!(index
        .record(&project, &weekly_sync(), MessageRef(102))
        .await
        .unwrap());

    let entries = index.entries(&project).await;
    assert_eq!(entries.len(), 4);
    assert_eq!(
        index.lookup(&project, "02:03:2024 09:00:00 - Retro").await,
        vec![MessageRef(7), MessageRef(8)]
    );
    assert_eq!(
        index.lookup_meeting(&project, &weekly_sync()).await,
        vec![MessageRef(101), MessageRef(102)]
    );

    let content = std::fs::read_to_string(&project.index_file).unwrap();
    assert!(content.lines().all(|l| l.starts_with('{') && l.ends_with('}')));
    assert!(matches!(
        parse_index(&content, &project.index_file),
        StoredIndex::Log(_)
    ));
}

#[tokio::test]
async fn test_concurrent_records_all_persist() {
    let (_dir, project, index) = setup();
    let index = Arc::new(index);
    let project = Arc::new(project);

    let mut handles = Vec::new();
    for i in 0..16 {
        let index = Arc::clone(&index);
        let project = Arc::clone(&project);
        handles.push(tokio::spawn(async move {
            let mut meeting = weekly_sync();
            meeting.recording_id = format!("video-{}", i);
            index
                .record(&project, &meeting, MessageRef(1000 + i))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(index.entries(&project).await.len(), 16);
}

#[test]
fn test_parse_empty_content() {
    assert_eq!(
        parse_index("  \n", Path::new("x")),
        StoredIndex::Log(Vec::new())
    );
}

#[test]
fn test_lock_path() {
    assert_eq!(
        lock_path(Path::new("/idx/krauz.jsonl")),
        PathBuf::from("/idx/krauz.jsonl.lock")
    );
}
