use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::{FrameResult, MonotonicClock, VideoReader};

/// Decodes video frames via ffmpeg-next and stamps them with their
/// presentation time.
///
/// Each decoded frame is converted to RGB24 and turned upright according
/// to the stream's display rotation, so phone recordings reach the face
/// detector the right way up. Timestamps come from the frame's best-effort
/// PTS scaled by the stream time base, falling back to `index / fps` when
/// the container has none.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    time_base: f64,
    rotation: u32,
    metadata: Option<VideoMetadata>,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
            time_base: 0.0,
            rotation: 0,
            metadata: None,
        }
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

type Decoding = (
    ffmpeg_next::decoder::Video,
    ffmpeg_next::software::scaling::Context,
);

fn open_decoder(
    ictx: &ffmpeg_next::format::context::Input,
) -> Result<Decoding, Box<dyn std::error::Error>> {
    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;
    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg_next::format::Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;
    Ok((decoder, scaler))
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.avg_frame_rate();
        let rate = if rate.denominator() != 0 && rate.numerator() != 0 {
            rate
        } else {
            stream.rate()
        };
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let rotation = stream_rotation(&stream);
        let (width, height) = if rotation % 180 == 0 {
            (decoder.width(), decoder.height())
        } else {
            (decoder.height(), decoder.width())
        };
        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
            rotation,
        };

        self.video_stream_index = stream.index();
        self.time_base = f64::from(stream.time_base());
        self.rotation = rotation;
        self.metadata = Some(metadata.clone());
        self.input_ctx = Some(ictx);

        log::debug!(
            "opened {} ({}x{} @ {:.2} fps, {}, rotated {}°)",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec,
            metadata.rotation
        );
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        let fps = self.metadata.as_ref().map_or(0.0, |m| m.fps);
        let Some(ictx) = self.input_ctx.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };
        let (decoder, scaler) = match open_decoder(ictx) {
            Ok(decoding) => decoding,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        Box::new(FfmpegFrameIter {
            width: decoder.width(),
            height: decoder.height(),
            ictx,
            decoder,
            scaler,
            video_stream_index: self.video_stream_index,
            time_base: self.time_base,
            rotation: self.rotation,
            clock: MonotonicClock::new(fps),
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.rotation = 0;
        self.metadata = None;
    }
}

/// Lazy iterator that decodes video frames one at a time.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    time_base: f64,
    rotation: u32,
    clock: MonotonicClock,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<FrameResult> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(Box::new(e)));
        }

        let reported = decoded
            .timestamp()
            .or_else(|| decoded.pts())
            .filter(|_| self.time_base > 0.0)
            .map(|pts| pts as f64 * self.time_base);
        let timestamp_sec = self.clock.next(reported, self.frame_index);

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(
            pixels,
            self.width,
            self.height,
            3,
            self.frame_index,
            timestamp_sec,
        );
        self.frame_index += 1;
        Some(Ok(orient(frame, self.rotation)))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = FrameResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("skipping undecodable packet: {e}");
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Clockwise display rotation of a stream: the DisplayMatrix side data when
/// present, else the legacy `rotate` tag, else 0.
fn stream_rotation(stream: &ffmpeg_next::format::stream::Stream) -> u32 {
    let from_matrix = stream
        .side_data()
        .filter(|sd| sd.kind() == ffmpeg_next::codec::packet::side_data::Type::DisplayMatrix)
        .find_map(|sd| display_matrix_rotation(sd.data()));
    let angle = from_matrix.or_else(|| {
        stream
            .metadata()
            .get("rotate")
            .and_then(|tag| tag.trim().parse::<f64>().ok())
    });
    angle.map_or(0, quarter_turns)
}

/// Clockwise angle in degrees encoded by a 3x3 display matrix (nine
/// little-endian 16.16 fixed-point `i32`s), read from its first row.
fn display_matrix_rotation(data: &[u8]) -> Option<f64> {
    if data.len() < 36 {
        return None;
    }
    let fixed = |i: usize| -> Option<f64> {
        let bytes: [u8; 4] = data.get(i * 4..i * 4 + 4)?.try_into().ok()?;
        Some(f64::from(i32::from_le_bytes(bytes)) / 65536.0)
    };
    let (m00, m01) = (fixed(0)?, fixed(1)?);
    if m00 == 0.0 && m01 == 0.0 {
        return None;
    }
    Some(m01.atan2(m00).to_degrees())
}

/// Snaps an angle to the nearest of 0, 90, 180 or 270.
fn quarter_turns(angle_deg: f64) -> u32 {
    let turns = (angle_deg / 90.0).round().rem_euclid(4.0);
    turns as u32 * 90
}

fn orient(frame: Frame, rotation: u32) -> Frame {
    if rotation == 0 {
        frame
    } else {
        frame.rotated(rotation)
    }
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping
/// per-row stride padding.
pub(crate) fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    /// Encodes a short MPEG-4 clip of flat grey frames whose brightness
    /// changes every frame.
    fn write_clip(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg_next::encoder::Video,
                         octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = ((i * 40) % 256) as u8;
            rgb.data_mut(0).fill(value);

            let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            drain(&mut encoder, &mut octx);
        }
        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn clip(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("face.mp4");
        write_clip(&path, frames, 160, 120, 25);
        path
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 5);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source_path, Some(path));
        assert!(reader.metadata().is_some());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open(Path::new("/nonexistent/face.mp4")).is_err());
    }

    #[test]
    fn test_frames_are_rgb_and_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 5);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let frames: Vec<Frame> = reader.frames().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 8);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        let stamps: Vec<f64> = reader
            .frames()
            .map(|f| f.unwrap().timestamp_sec())
            .collect();

        assert_eq!(stamps.len(), 8);
        assert!(stamps.windows(2).all(|w| w[1] > w[0]));
        let span = stamps[7] - stamps[0];
        assert!((span - 7.0 / 25.0).abs() < 0.02, "span was {span}");
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = FfmpegReader::new();
        assert!(reader.frames().next().unwrap().is_err());
    }

    fn display_matrix(m00: f64, m01: f64) -> Vec<u8> {
        let fixed = |v: f64| ((v * 65536.0) as i32).to_le_bytes();
        let mut data = vec![0u8; 36];
        data[0..4].copy_from_slice(&fixed(m00));
        data[4..8].copy_from_slice(&fixed(m01));
        data[12..16].copy_from_slice(&fixed(-m01));
        data[16..20].copy_from_slice(&fixed(m00));
        data[32..36].copy_from_slice(&(1 << 30i32).to_le_bytes());
        data
    }

    #[rstest]
    #[case(1.0, 0.0, 0)]
    #[case(0.0, 1.0, 90)]
    #[case(-1.0, 0.0, 180)]
    #[case(0.0, -1.0, 270)]
    fn test_display_matrix_rotation(#[case] m00: f64, #[case] m01: f64, #[case] expected: u32) {
        let angle = display_matrix_rotation(&display_matrix(m00, m01)).unwrap();
        assert_eq!(quarter_turns(angle), expected);
    }

    #[test]
    fn test_display_matrix_rejects_short_or_empty_data() {
        assert!(display_matrix_rotation(&[0u8; 20]).is_none());
        assert!(display_matrix_rotation(&[0u8; 36]).is_none());
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(44.0, 0)]
    #[case(46.0, 90)]
    #[case(-90.0, 270)]
    #[case(180.0, 180)]
    #[case(-180.0, 180)]
    #[case(270.0, 270)]
    #[case(360.0, 0)]
    #[case(450.0, 90)]
    fn test_quarter_turns(#[case] angle: f64, #[case] expected: u32) {
        assert_eq!(quarter_turns(angle), expected);
    }

    #[test]
    fn test_portrait_frames_are_turned_upright() {
        // A 4x2 landscape buffer stored by a phone held upright.
        let frame = Frame::new((0..24).collect(), 4, 2, 3, 3, 0.1);
        let upright = orient(frame.clone(), 90);
        assert_eq!((upright.width(), upright.height()), (2, 4));
        assert_eq!(upright.index(), 3);

        let untouched = orient(frame.clone(), 0);
        assert_eq!(untouched.data(), frame.data());
    }

    #[test]
    fn test_unrotated_clip_reports_zero_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 2);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!(meta.rotation, 0);
        let frame = reader.frames().next().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (meta.width, meta.height));
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = clip(dir.path(), 1);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
        assert!(reader.metadata().is_none());
    }
}
