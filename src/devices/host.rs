// Copyright @yucwang 2026

use crate::core::device::{Dispatch, GpuDevice, TextureDescriptor, TextureId};
use crate::core::error::{Result, VolumeError};
use crate::core::kernel::TextureView;

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;

struct HostTexture {
    descriptor: TextureDescriptor,
    data: RwLock<Vec<u8>>,
}

#[derive(Default)]
struct HostState {
    textures: HashMap<TextureId, Arc<HostTexture>>,
    allocated: usize,
    next_id: u64,
}

/// CPU implementation of `GpuDevice`. Textures live in host memory and
/// compute lanes are handed out in fixed-size blocks to scoped worker
/// threads.
pub struct HostDevice {
    state: Mutex<HostState>,
    memory_budget: Option<usize>,
    threads: usize,
    block_size: usize,
    show_progress: bool,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    pub fn new() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            state: Mutex::new(HostState::default()),
            memory_budget: None,
            threads,
            block_size: 1024,
            show_progress: false,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Caps the total bytes of live textures.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn with_block_size(mut self, lanes: usize) -> Self {
        self.block_size = lanes.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn allocated_bytes(&self) -> usize {
        self.lock_state().allocated
    }

    pub fn texture_count(&self) -> usize {
        self.lock_state().textures.len()
    }

    /// Copies a texture's contents back to the caller.
    pub fn read_texture(&self, id: TextureId) -> Option<Vec<u8>> {
        let texture = self.lock_state().textures.get(&id).cloned()?;
        let data = texture.data.read().unwrap_or_else(PoisonError::into_inner);
        Some(data.clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, id: TextureId) -> Result<Arc<HostTexture>> {
        self.lock_state()
            .textures
            .get(&id)
            .cloned()
            .ok_or(VolumeError::InvalidHandle(id.0))
    }

    fn progress_bar(&self, total_blocks: usize, name: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(total_blocks as u64);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {msg} {bar:40.cyan/blue} {pos}/{len} blocks")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message(name);
        progress
    }
}

impl GpuDevice for HostDevice {
    fn create_texture_3d(&self, descriptor: TextureDescriptor) -> Result<TextureId> {
        let bytes = descriptor.byte_size()?;
        let mut state = self.lock_state();
        if let Some(budget) = self.memory_budget {
            if state.allocated.saturating_add(bytes) > budget {
                return Err(VolumeError::ResourceExhausted(format!(
                    "{} bytes requested, {} of {} bytes in use",
                    bytes, state.allocated, budget
                )));
            }
        }

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|e| VolumeError::ResourceExhausted(format!("{} bytes: {}", bytes, e)))?;
        data.resize(bytes, 0u8);

        let id = TextureId(state.next_id);
        state.next_id += 1;
        state.allocated += bytes;
        state.textures.insert(id, Arc::new(HostTexture { descriptor, data: RwLock::new(data) }));
        Ok(id)
    }

    fn write_texture_3d(&self, id: TextureId, first_slice: usize, bytes: &[u8]) -> Result<()> {
        let texture = self.lookup(id)?;
        let slice_bytes = texture.descriptor.slice_bytes();
        let mut data = texture.data.write().unwrap_or_else(PoisonError::into_inner);
        let offset = first_slice.saturating_mul(slice_bytes);
        let end = offset.saturating_add(bytes.len());
        if slice_bytes == 0 || bytes.len() % slice_bytes != 0 || end > data.len() {
            return Err(VolumeError::SizeMismatch {
                expected: data.len().saturating_sub(offset) as u64,
                actual: bytes.len() as u64,
            });
        }
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn dispatch_compute(&self, dispatch: Dispatch<'_>, output: &mut [f32]) -> Result<()> {
        let kernel = dispatch.kernel;
        let lanes = kernel.lanes();
        let channels = kernel.channels();
        let expected = lanes * channels;
        if output.len() != expected {
            return Err(VolumeError::SizeMismatch { expected: expected as u64, actual: output.len() as u64 });
        }
        if lanes == 0 {
            return Ok(());
        }

        let textures = dispatch
            .bindings
            .iter()
            .map(|id| self.lookup(*id))
            .collect::<Result<Vec<_>>>()?;
        let guards: Vec<_> = textures
            .iter()
            .map(|t| t.data.read().unwrap_or_else(PoisonError::into_inner))
            .collect();
        let mut views = Vec::with_capacity(textures.len());
        for (texture, guard) in textures.iter().zip(guards.iter()) {
            let view = TextureView::new(texture.descriptor, guard.as_slice()).ok_or_else(|| {
                VolumeError::SizeMismatch { expected: 0, actual: guard.len() as u64 }
            })?;
            views.push(view);
        }

        let block_size = self.block_size;
        let total_blocks = (lanes + block_size - 1) / block_size;
        let cancel = dispatch.cancel;
        let is_cancelled = || cancel.map_or(false, |c| c.is_cancelled());
        let progress = self.progress_bar(total_blocks, kernel.name());
        let next_block = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<(usize, Vec<f32>)>();
        let views_ref: &[TextureView<'_>] = &views;
        let mut completed = 0usize;

        log::debug!(
            "Dispatching '{}': {} lanes x {} channels in {} blocks on {} threads.",
            kernel.name(), lanes, channels, total_blocks, self.threads
        );

        thread::scope(|scope| {
            for _ in 0..self.threads.min(total_blocks) {
                let next_block = Arc::clone(&next_block);
                let tx = tx.clone();
                scope.spawn(move || {
                    loop {
                        if is_cancelled() {
                            break;
                        }
                        let block_index = next_block.fetch_add(1, Ordering::Relaxed);
                        if block_index >= total_blocks {
                            break;
                        }

                        let first = block_index * block_size;
                        let last = (first + block_size).min(lanes);
                        let mut block = vec![0.0f32; (last - first) * channels];
                        for (lane, out) in (first..last).zip(block.chunks_exact_mut(channels)) {
                            kernel.invoke(lane, views_ref, out);
                        }
                        if tx.send((first, block)).is_err() {
                            break;
                        }
                    }
                });
            }

            drop(tx);
            for (first, block) in rx.iter() {
                let start = first * channels;
                output[start..start + block.len()].copy_from_slice(&block);
                completed += 1;
                progress.inc(1);
            }
        });
        progress.finish_and_clear();

        if completed < total_blocks {
            log::debug!("Dispatch '{}' cancelled after {}/{} blocks.", kernel.name(), completed, total_blocks);
            return Err(VolumeError::BuildCancelled);
        }
        Ok(())
    }

    fn release_resource(&self, id: TextureId) {
        let mut state = self.lock_state();
        if let Some(texture) = state.textures.remove(&id) {
            let bytes = texture.descriptor.byte_size().unwrap_or(0);
            state.allocated = state.allocated.saturating_sub(bytes);
        }
    }

    fn describe(&self) -> String {
        format!("HostDevice {{ threads: {}, block_size: {} }}", self.threads, self.block_size)
    }
}
