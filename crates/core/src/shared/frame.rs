use ndarray::{s, ArrayView3};

/// A single camera/video frame: contiguous RGB bytes in row-major order,
/// stamped with its capture time.
///
/// Format conversion happens at I/O boundaries only; the measurement
/// layer never sees pixels, only the samples extracted from them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    timestamp_sec: f64,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        index: usize,
        timestamp_sec: f64,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            timestamp_sec,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp_sec(&self) -> f64 {
        self.timestamp_sec
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Mean value of each of the first three channels inside the pixel
    /// rectangle `[x0, x1) × [y0, y1)`, clamped to the frame.
    ///
    /// Returns `None` for an empty rectangle or a frame with fewer than
    /// three channels.
    pub fn mean_rgb(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<[f64; 3]> {
        if self.channels < 3 {
            return None;
        }
        let x1 = x1.min(self.width) as usize;
        let y1 = y1.min(self.height) as usize;
        let x0 = (x0 as usize).min(x1);
        let y0 = (y0 as usize).min(y1);
        if x0 == x1 || y0 == y1 {
            return None;
        }

        let view = self.as_ndarray();
        let roi = view.slice(s![y0..y1, x0..x1, ..3]);
        let count = ((x1 - x0) * (y1 - y0)) as f64;
        let mut sums = [0.0f64; 3];
        for pixel in roi.rows() {
            for (c, value) in pixel.iter().enumerate() {
                sums[c] += *value as f64;
            }
        }
        Some([sums[0] / count, sums[1] / count, sums[2] / count])
    }

    /// The frame turned clockwise by `degrees` (0, 90, 180 or 270; other
    /// values leave it as is). Width and height swap for quarter turns.
    pub fn rotated(&self, degrees: u32) -> Frame {
        let view = self.as_ndarray();
        let turned = match degrees % 360 {
            90 => view.permuted_axes([1, 0, 2]).slice_move(s![.., ..;-1, ..]),
            180 => view.slice_move(s![..;-1, ..;-1, ..]),
            270 => view.permuted_axes([1, 0, 2]).slice_move(s![..;-1, .., ..]),
            _ => return self.clone(),
        };
        let (height, width, _) = turned.dim();
        Frame::new(
            turned.iter().copied().collect(),
            width as u32,
            height as u32,
            self.channels,
            self.index,
            self.timestamp_sec,
        )
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
