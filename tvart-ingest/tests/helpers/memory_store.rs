//! In-memory device with scriptable upload faults

use async_trait::async_trait;
use image::imageops::FilterType;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use tvart_ingest::device::{ArtStore, DeviceError, MediaType, RemoteItem};

pub const CATEGORY: &str = "MY-C0002";

#[derive(Debug, Clone, Copy)]
pub enum UploadFault {
    Transient,
    Rejected,
}

#[derive(Default)]
struct State {
    items: BTreeMap<String, Vec<u8>>,
    next_id: u32,
    faults: VecDeque<UploadFault>,
    upload_calls: usize,
    mattes: Vec<Option<String>>,
    deleted: Vec<String>,
    selected: Option<String>,
}

#[derive(Default)]
pub struct MemoryArtStore {
    state: Mutex<State>,
}

impl MemoryArtStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload calls fail with these faults, in order, before succeeding
    pub fn push_faults(&self, faults: &[UploadFault]) {
        self.state.lock().unwrap().faults.extend(faults.iter().copied());
    }

    /// Place content on the device without going through `upload`
    pub fn insert(&self, data: Vec<u8>) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("MY_F{:04}", state.next_id);
        state.items.insert(id.clone(), data);
        id
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().unwrap().items.keys().cloned().collect()
    }

    pub fn upload_calls(&self) -> usize {
        self.state.lock().unwrap().upload_calls
    }

    /// Device matte requested by every upload call
    pub fn mattes(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().mattes.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.state.lock().unwrap().selected.clone()
    }
}

fn thumbnail(data: &[u8]) -> Result<Vec<u8>, DeviceError> {
    let image = image::load_from_memory(data).map_err(|e| DeviceError::Protocol(e.to_string()))?;
    let mut buf = Vec::new();
    image
        .resize_exact(384, 216, FilterType::Triangle)
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| DeviceError::Protocol(e.to_string()))?;
    Ok(buf)
}

#[async_trait]
impl ArtStore for MemoryArtStore {
    async fn list(&self, category: &str) -> Result<Vec<RemoteItem>, DeviceError> {
        if category != CATEGORY {
            return Ok(Vec::new());
        }
        Ok(self
            .ids()
            .into_iter()
            .map(|content_id| RemoteItem {
                content_id,
                category: CATEGORY.to_string(),
            })
            .collect())
    }

    async fn thumbnails(
        &self,
        content_ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, DeviceError> {
        let state = self.state.lock().unwrap();
        let mut out = HashMap::new();
        for id in content_ids {
            let data = state
                .items
                .get(id)
                .ok_or_else(|| DeviceError::NotFound(id.clone()))?;
            out.insert(format!("{}.jpg", id), thumbnail(data)?);
        }
        Ok(out)
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        _media_type: MediaType,
        matte: Option<&str>,
    ) -> Result<String, DeviceError> {
        {
            let mut state = self.state.lock().unwrap();
            state.upload_calls += 1;
            state.mattes.push(matte.map(str::to_string));
            match state.faults.pop_front() {
                Some(UploadFault::Transient) => {
                    return Err(DeviceError::Transient("connection reset".to_string()))
                }
                Some(UploadFault::Rejected) => {
                    return Err(DeviceError::Rejected("unsupported image".to_string()))
                }
                None => {}
            }
        }
        Ok(self.insert(data))
    }

    async fn delete(&self, content_ids: &[String]) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        for id in content_ids {
            state.items.remove(id);
            state.deleted.push(id.clone());
        }
        Ok(())
    }

    async fn select(&self, content_id: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        if !state.items.contains_key(content_id) {
            return Err(DeviceError::NotFound(content_id.to_string()));
        }
        state.selected = Some(content_id.to_string());
        Ok(())
    }
}
