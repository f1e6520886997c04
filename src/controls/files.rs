use serde::Serialize;
use tracing::{debug, info};

use crate::{
    camera::{
        models::{FileKind, HumanSize, RecordedFile},
        service::CameraService,
    },
    core::{errors::CameraError, events::Notice, state::CameraId},
};

/// A camera's stored media, split by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListing {
    pub camera_id: CameraId,
    pub videos: Vec<RecordedFile>,
    pub images: Vec<RecordedFile>,
    /// e.g. "1.5 MB"
    pub total_size: String,
}

impl CameraService {
    pub async fn list_files(&self, camera_id: CameraId) -> Result<FileListing, CameraError> {
        self.ensure_known(camera_id)?;
        let files = self
            .backend()
            .list_files(camera_id)
            .await
            .map_err(|err| self.action_failed(camera_id, "list files", err))?;

        let total_size = HumanSize(files.iter().map(|file| file.size).sum()).to_string();
        let (videos, images): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|file| file.file_type == FileKind::Video);
        debug!(camera_id, videos = videos.len(), images = images.len(), "files listed");
        Ok(FileListing {
            camera_id,
            videos,
            images,
            total_size,
        })
    }

    pub fn download_url(
        &self,
        camera_id: CameraId,
        kind: FileKind,
        filename: &str,
    ) -> Result<String, CameraError> {
        self.ensure_known(camera_id)?;
        Ok(self.backend().file_url(camera_id, kind, filename))
    }

    pub async fn delete_file(
        &self,
        camera_id: CameraId,
        kind: FileKind,
        filename: &str,
    ) -> Result<(), CameraError> {
        self.ensure_known(camera_id)?;
        self.backend()
            .delete_file(camera_id, kind, filename)
            .await
            .map_err(|err| self.action_failed(camera_id, "delete file", err))?;

        info!(camera_id, filename, "file deleted");
        self.events().notice(Notice::success(
            Some(camera_id),
            format!("file deleted: {filename}"),
        ));
        Ok(())
    }
}
