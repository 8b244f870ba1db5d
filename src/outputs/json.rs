//! JSON export of extracted records and conversation transcripts.
//!
//! Files are grouped per site, one file per edition of the day:
//! ```text
//! json_output_dir/
//! └── www.varzesh3.com/
//!     ├── 2025-05-06_morning.json
//!     ├── 2025-05-06_morning_transcript.json
//!     └── 2025-05-06_evening.json
//! ```
//! A later run in the same edition overwrites the earlier file.

use crate::models::{ArticleRecord, ConversationMessage};
use crate::utils::time_of_day;
use chrono::Local;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Serialize)]
struct RecordsFile<'a> {
    domain: &'a str,
    local_date: String,
    time_of_day: String,
    count: usize,
    articles: &'a [ArticleRecord],
}

#[derive(Serialize)]
struct TranscriptFile<'a> {
    domain: &'a str,
    local_date: String,
    messages: &'a [ConversationMessage],
}

fn edition_path(json_output_dir: &str, domain: &str, suffix: &str) -> PathBuf {
    let stem = format!("{}_{}{}", Local::now().date_naive(), time_of_day(), suffix);
    // ports contain ':' which some filesystems reject
    let dir_name = domain.replace(':', "_");
    Path::new(json_output_dir)
        .join(dir_name)
        .join(format!("{stem}.json"))
}

async fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }
    fs::write(path, json).await?;
    Ok(())
}

/// Write `records` for `domain`, returning the file path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, domain = %domain))]
pub async fn write_records(
    records: &[ArticleRecord],
    json_output_dir: &str,
    domain: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = edition_path(json_output_dir, domain, "");
    let file = RecordsFile {
        domain,
        local_date: Local::now().date_naive().to_string(),
        time_of_day: time_of_day(),
        count: records.len(),
        articles: records,
    };
    write_pretty(&path, &file).await?;
    info!(path = %path.display(), count = records.len(), "Wrote records JSON");
    Ok(path)
}

/// Write the question/answer transcript for `domain`, returning the file path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, domain = %domain))]
pub async fn write_transcript(
    messages: &[ConversationMessage],
    json_output_dir: &str,
    domain: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = edition_path(json_output_dir, domain, "_transcript");
    let file = TranscriptFile {
        domain,
        local_date: Local::now().date_naive().to_string(),
        messages,
    };
    write_pretty(&path, &file).await?;
    info!(path = %path.display(), turns = messages.len(), "Wrote transcript JSON");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> ArticleRecord {
        ArticleRecord {
            title: Some(title.to_string()),
            link: Some(format!("https://n.test/{title}")),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_write_records_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();
        let path = write_records(&[record("a"), record("b")], out, "n.test")
            .await
            .unwrap();

        assert_eq!(path.parent().unwrap(), dir.path().join("n.test"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&Local::now().date_naive().to_string()));
        assert!(name.ends_with(".json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["articles"][1]["link"], "https://n.test/b");
    }

    #[tokio::test]
    async fn test_write_transcript_sanitises_port() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();
        let messages = vec![
            ConversationMessage::user("How many?"),
            ConversationMessage::assistant("Two."),
        ];
        let path = write_transcript(&messages, out, "localhost:8080").await.unwrap();

        assert_eq!(path.parent().unwrap(), dir.path().join("localhost_8080"));
        assert!(path.to_str().unwrap().ends_with("_transcript.json"));
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "Two.");
    }
}
