use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::encode::ffmpeg::ensure_parent_dir;
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Frame, FrameIndex};
use crate::foundation::error::{ToonsyncError, ToonsyncResult};
use crate::picture::encode_jpeg;

// Fixed header layout; everything before the first `movi` chunk has a constant size.
const RIFF_SIZE_AT: u64 = 4;
const AVIH_MAX_BYTES_AT: u64 = 36;
const AVIH_TOTAL_FRAMES_AT: u64 = 48;
const AVIH_BUFFER_AT: u64 = 60;
const STRH_LENGTH_AT: u64 = 140;
const STRH_BUFFER_AT: u64 = 144;
const MOVI_SIZE_AT: u64 = 216;
const MOVI_FOURCC_AT: u64 = 220;
const HEADER_LEN: u64 = 224;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

struct IndexEntry {
    offset: u32,
    size: u32,
}

/// Motion-JPEG AVI writer over any seekable byte sink.
///
/// Frames are appended as `00dc` chunks; `finish` writes the `idx1` index and patches the
/// sizes and counts left as zero in the header.
pub struct AviWriter<W: Write + Seek> {
    inner: W,
    fps: u32,
    index: Vec<IndexEntry>,
    pos: u64,
    max_chunk: u32,
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(mut inner: W, width: u32, height: u32, fps: u32) -> ToonsyncResult<Self> {
        if fps == 0 || width == 0 || height == 0 {
            return Err(ToonsyncError::validation(
                "avi needs non-zero width, height and fps",
            ));
        }
        let w = i32::try_from(width).map_err(|_| ToonsyncError::validation("avi width too large"))?;
        let h =
            i32::try_from(height).map_err(|_| ToonsyncError::validation("avi height too large"))?;
        let rc_w = i16::try_from(width).unwrap_or(i16::MAX);
        let rc_h = i16::try_from(height).unwrap_or(i16::MAX);

        let mut hdr = Vec::with_capacity(HEADER_LEN as usize);
        hdr.extend_from_slice(b"RIFF");
        put_u32(&mut hdr, 0);
        hdr.extend_from_slice(b"AVI ");

        hdr.extend_from_slice(b"LIST");
        put_u32(&mut hdr, 192);
        hdr.extend_from_slice(b"hdrl");

        hdr.extend_from_slice(b"avih");
        put_u32(&mut hdr, 56);
        put_u32(&mut hdr, 1_000_000 / fps);
        put_u32(&mut hdr, 0); // max bytes/sec, patched
        put_u32(&mut hdr, 0);
        put_u32(&mut hdr, AVIF_HASINDEX);
        put_u32(&mut hdr, 0); // total frames, patched
        put_u32(&mut hdr, 0);
        put_u32(&mut hdr, 1);
        put_u32(&mut hdr, 0); // suggested buffer, patched
        put_u32(&mut hdr, width);
        put_u32(&mut hdr, height);
        hdr.extend_from_slice(&[0u8; 16]);

        hdr.extend_from_slice(b"LIST");
        put_u32(&mut hdr, 116);
        hdr.extend_from_slice(b"strl");

        hdr.extend_from_slice(b"strh");
        put_u32(&mut hdr, 56);
        hdr.extend_from_slice(b"vids");
        hdr.extend_from_slice(b"MJPG");
        put_u32(&mut hdr, 0);
        put_u16(&mut hdr, 0);
        put_u16(&mut hdr, 0);
        put_u32(&mut hdr, 0);
        put_u32(&mut hdr, 1); // scale
        put_u32(&mut hdr, fps); // rate
        put_u32(&mut hdr, 0);
        put_u32(&mut hdr, 0); // length, patched
        put_u32(&mut hdr, 0); // suggested buffer, patched
        put_u32(&mut hdr, u32::MAX);
        put_u32(&mut hdr, 0);
        for v in [0i16, 0, rc_w, rc_h] {
            hdr.extend_from_slice(&v.to_le_bytes());
        }

        hdr.extend_from_slice(b"strf");
        put_u32(&mut hdr, 40);
        put_u32(&mut hdr, 40);
        hdr.extend_from_slice(&w.to_le_bytes());
        hdr.extend_from_slice(&h.to_le_bytes());
        put_u16(&mut hdr, 1);
        put_u16(&mut hdr, 24);
        hdr.extend_from_slice(b"MJPG");
        put_u32(&mut hdr, width.saturating_mul(height).saturating_mul(3));
        hdr.extend_from_slice(&[0u8; 16]);

        hdr.extend_from_slice(b"LIST");
        put_u32(&mut hdr, 0); // movi size, patched
        hdr.extend_from_slice(b"movi");
        debug_assert_eq!(hdr.len() as u64, HEADER_LEN);

        inner.write_all(&hdr).context("write avi header")?;
        Ok(Self {
            inner,
            fps,
            index: Vec::new(),
            pos: HEADER_LEN,
            max_chunk: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Append one already-encoded JPEG image.
    pub fn write_jpeg(&mut self, jpeg: &[u8]) -> ToonsyncResult<()> {
        let size = u32::try_from(jpeg.len())
            .map_err(|_| ToonsyncError::encoder("avi frame exceeds 4 GiB"))?;
        let offset = u32::try_from(self.pos - MOVI_FOURCC_AT)
            .map_err(|_| ToonsyncError::encoder("avi movi list exceeds 4 GiB"))?;

        self.inner.write_all(b"00dc").context("write avi chunk")?;
        self.inner
            .write_all(&size.to_le_bytes())
            .context("write avi chunk")?;
        self.inner.write_all(jpeg).context("write avi chunk")?;
        let mut written = 8 + u64::from(size);
        if size % 2 == 1 {
            self.inner.write_all(&[0]).context("write avi chunk")?;
            written += 1;
        }

        self.index.push(IndexEntry { offset, size });
        self.pos += written;
        self.max_chunk = self.max_chunk.max(size);
        Ok(())
    }

    /// Write the index, patch the header and hand back the inner writer.
    pub fn finish(mut self) -> ToonsyncResult<W> {
        let movi_size = self.pos - MOVI_FOURCC_AT;

        let mut idx = Vec::with_capacity(8 + 16 * self.index.len());
        idx.extend_from_slice(b"idx1");
        put_u32(&mut idx, 16 * self.index.len() as u32);
        for e in &self.index {
            idx.extend_from_slice(b"00dc");
            put_u32(&mut idx, AVIIF_KEYFRAME);
            put_u32(&mut idx, e.offset);
            put_u32(&mut idx, e.size);
        }
        self.inner.write_all(&idx).context("write avi index")?;
        let end = self.pos + idx.len() as u64;

        let frames = self.index.len() as u32;
        let riff_size = u32::try_from(end - 8)
            .map_err(|_| ToonsyncError::encoder("avi file exceeds 4 GiB"))?;
        let patches = [
            (RIFF_SIZE_AT, riff_size),
            (AVIH_MAX_BYTES_AT, self.max_chunk.saturating_mul(self.fps)),
            (AVIH_TOTAL_FRAMES_AT, frames),
            (AVIH_BUFFER_AT, self.max_chunk),
            (STRH_LENGTH_AT, frames),
            (STRH_BUFFER_AT, self.max_chunk),
            (MOVI_SIZE_AT, movi_size as u32),
        ];
        for (at, v) in patches {
            self.inner
                .seek(SeekFrom::Start(at))
                .context("seek avi header")?;
            self.inner
                .write_all(&v.to_le_bytes())
                .context("patch avi header")?;
        }
        self.inner
            .seek(SeekFrom::Start(end))
            .context("seek avi end")?;
        self.inner.flush().context("flush avi")?;
        Ok(self.inner)
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Sink writing every frame as a JPEG into an AVI file.
pub struct AviSink {
    path: PathBuf,
    quality: u8,
    writer: Option<AviWriter<BufWriter<File>>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl AviSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quality: 90,
            writer: None,
            cfg: None,
            last_idx: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for AviSink {
    fn begin(&mut self, cfg: SinkConfig) -> ToonsyncResult<()> {
        cfg.validate()?;
        ensure_parent_dir(&self.path)?;
        let file = File::create(&self.path)
            .with_context(|| format!("create avi '{}'", self.path.display()))?;
        self.writer = Some(AviWriter::new(
            BufWriter::new(file),
            cfg.width,
            cfg.height,
            cfg.fps,
        )?);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> ToonsyncResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ToonsyncError::evaluation("avi sink not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(ToonsyncError::evaluation(
                "avi sink received out-of-order frame index",
            ));
        }
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ToonsyncError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ToonsyncError::evaluation("avi sink is already finalized"))?;
        writer.write_jpeg(&encode_jpeg(frame, self.quality)?)?;
        self.last_idx = Some(idx);
        Ok(())
    }

    fn end(&mut self) -> ToonsyncResult<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| ToonsyncError::evaluation("avi sink not started"))?;
        let frames = writer.frame_count();
        writer.finish()?;
        self.cfg = None;
        tracing::debug!(path = %self.path.display(), frames, "avi written");
        Ok(())
    }
}
