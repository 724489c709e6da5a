use std::path::{Path, PathBuf};
use system::{DocumentError, DocumentSnapshot};
use thiserror::Error;
use tokio::fs;

const CAPTIONS_FILE: &str = "captions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid episode name {0:?}")]
    InvalidEpisode(String),
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("cannot encode captions: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Episodes on disk: `<media_dir>/<episode>/captions.json` next to the video and the
/// two audio stems. The offline pipeline creates them; the server only rewrites captions.
#[derive(Debug, Clone)]
pub struct EpisodeStore {
    media_dir: PathBuf,
}

impl EpisodeStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Directory names under the media directory, sorted.
    pub async fn list_episodes(&self) -> Result<Vec<String>, StoreError> {
        let mut result = Vec::new();
        let mut entries = fs::read_dir(&self.media_dir)
            .await
            .map_err(io_error(&self.media_dir))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(&self.media_dir))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_valid_episode(&name) => result.push(name),
                Ok(_) => {}
                Err(name) => log::debug!("skipping non-utf8 episode {:?}", name),
            }
        }
        result.sort();
        Ok(result)
    }

    pub async fn read_document(&self, episode: &str) -> Result<DocumentSnapshot, StoreError> {
        let path = self.captions_path(episode)?;
        let json = fs::read_to_string(&path).await.map_err(io_error(&path))?;
        Ok(DocumentSnapshot::from_json(&json)?)
    }

    /// Replaces the captions file through a temporary sibling, so readers never see a
    /// half-written document.
    pub async fn write_document(
        &self,
        episode: &str,
        document: &DocumentSnapshot,
    ) -> Result<(), StoreError> {
        document.validate()?;
        let path = self.captions_path(episode)?;
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(document)?;
        fs::write(&tmp, contents)
            .await
            .map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).await.map_err(io_error(&path))?;
        log::info!("rewrote {}", path.display());
        Ok(())
    }

    fn captions_path(&self, episode: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_episode(episode) {
            return Err(StoreError::InvalidEpisode(episode.into()));
        }
        Ok(self.media_dir.join(episode).join(CAPTIONS_FILE))
    }
}

/// A single path component that cannot escape the media directory.
fn is_valid_episode(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(|c: char| c == '/' || c == '\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use system::CaptionRecord;

    fn document(text: &str) -> DocumentSnapshot {
        DocumentSnapshot {
            characters: vec![],
            captions: vec![CaptionRecord {
                character: Some("Alice".into()),
                start: 0.0,
                end: 1.0,
                text: text.into(),
            }],
        }
    }

    #[tokio::test]
    async fn it_lists_episode_directories_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("ep2")).expect("mkdir");
        std::fs::create_dir(dir.path().join("ep1")).expect("mkdir");
        std::fs::write(dir.path().join("notes.txt"), "x").expect("write");
        let store = EpisodeStore::new(dir.path());
        assert_eq!(
            store.list_episodes().await.expect("listable"),
            vec!["ep1".to_string(), "ep2".to_string()]
        );
    }

    #[tokio::test]
    async fn it_rewrites_captions() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("ep1")).expect("mkdir");
        let store = EpisodeStore::new(dir.path());
        store
            .write_document("ep1", &document("hello"))
            .await
            .expect("writable");
        assert_eq!(
            store.read_document("ep1").await.expect("readable"),
            document("hello")
        );
        assert!(!dir.path().join("ep1").join("captions.json.tmp").exists());
    }

    #[tokio::test]
    async fn it_reports_missing_episode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EpisodeStore::new(dir.path());
        assert!(matches!(
            store.read_document("ep9").await,
            Err(StoreError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn it_rejects_escaping_names() {
        let store = EpisodeStore::new("/tmp");
        assert!(matches!(
            store.read_document("../etc").await,
            Err(StoreError::InvalidEpisode(_))
        ));
        assert!(matches!(
            store.write_document("a/b", &document("x")).await,
            Err(StoreError::InvalidEpisode(_))
        ));
    }
}
