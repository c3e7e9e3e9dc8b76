use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use edgeview_frame::{FrameSize, Plane, RawFrame, capture::FrameSource};
use tracing::{debug, info, warn};

use super::FramePacer;

type Decoder = y4m::Decoder<BufReader<File>>;

fn open_decoder(path: &Path) -> Result<Decoder> {
    let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    y4m::Decoder::new(BufReader::new(file))
        .map_err(|e| anyhow!("Error creating y4m decoder: {}", e))
        .with_context(|| format!("Reading the header of {}", path.display()))
}

/// Plays back an 8-bit 4:2:0 YUV4MPEG2 file, paced at the file's frame rate.
pub struct Y4mSource {
    path: PathBuf,
    decoder: Decoder,
    size: FrameSize,
    looping: bool,
    pacer: FramePacer,
    planes: [Vec<u8>; 3],
}

impl Y4mSource {
    pub fn open(path: &Path, fps_override: Option<u32>, looping: bool) -> Result<Self> {
        let decoder = open_decoder(path)?;

        match decoder.get_colorspace() {
            y4m::Colorspace::C420
            | y4m::Colorspace::C420jpeg
            | y4m::Colorspace::C420paldv
            | y4m::Colorspace::C420mpeg2 => {}
            other => bail!("Unsupported y4m colorspace {:?}, only 8-bit 4:2:0 is supported", other),
        }

        let width = u32::try_from(decoder.get_width()).context("Frame width out of range")?;
        let height = u32::try_from(decoder.get_height()).context("Frame height out of range")?;
        let size = FrameSize::new(width, height);
        super::check_frame_size(size)
            .with_context(|| format!("Unsupported frame size in {}", path.display()))?;

        let framerate = decoder.get_framerate();
        let pacer = match fps_override {
            Some(fps) => FramePacer::new(fps),
            None => FramePacer::from_ratio(framerate.num as u64, framerate.den as u64),
        };

        info!(
            path = %path.display(),
            width,
            height,
            rate = %format!("{}/{}", framerate.num, framerate.den),
            interval = ?pacer.interval(),
            looping,
            "Opened y4m source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            size,
            looping,
            pacer,
            planes: Default::default(),
        })
    }
}

impl FrameSource for Y4mSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        let mut rewound = false;
        loop {
            let planes = &mut self.planes;
            let result = self.decoder.read_frame().map(|frame| {
                for (dst, src) in planes.iter_mut().zip([
                    frame.get_y_plane(),
                    frame.get_u_plane(),
                    frame.get_v_plane(),
                ]) {
                    dst.clear();
                    dst.extend_from_slice(src);
                }
            });

            match result {
                Ok(()) => break,
                // an end right after rewinding means the file holds no frames at all
                Err(y4m::Error::EOF) if self.looping && rewound => {
                    warn!("{} has no frames to loop over", self.path.display());
                    return Ok(None);
                }
                Err(y4m::Error::EOF) if self.looping => {
                    debug!("Reached the end of {}, rewinding", self.path.display());
                    self.decoder = open_decoder(&self.path)?;
                    rewound = true;
                }
                Err(y4m::Error::EOF) => return Ok(None),
                Err(e) => bail!("Error reading y4m frame: {}", e),
            }
        }

        self.pacer.wait();

        let width = self.size.width as usize;
        let [y, u, v] = &self.planes;
        Ok(Some(RawFrame {
            size: self.size,
            y: Plane::packed(y, width),
            u: Plane::packed(u, width / 2),
            v: Plane::packed(v, width / 2),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_clip(name: &str, header: &str, frames: &[[u8; 12]]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("edgeview-{}-{}.y4m", name, std::process::id()));
        let mut data = header.as_bytes().to_vec();
        for frame in frames {
            data.extend_from_slice(b"FRAME\n");
            data.extend_from_slice(frame);
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    // 4x2: 8 luma bytes, then 2 U and 2 V
    const FIRST: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 20, 21];
    const SECOND: [u8; 12] = [9; 12];

    #[test]
    fn test_reads_frames_then_ends() {
        let path = write_clip("ends", "YUV4MPEG2 W4 H2 F1000:1 C420jpeg\n", &[FIRST, SECOND]);
        let mut source = Y4mSource::open(&path, None, false).unwrap();
        assert_eq!(source.frame_size(), FrameSize::new(4, 2));

        {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.y.data, &FIRST[..8]);
            assert_eq!(frame.u.data, &[10, 11]);
            assert_eq!(frame.v.data, &[20, 21]);
            assert!(frame.validate().is_ok());
        }
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_looping_rewinds() {
        let path = write_clip("loops", "YUV4MPEG2 W4 H2 F1000:1 C420\n", &[FIRST]);
        let mut source = Y4mSource::open(&path, None, true).unwrap();

        for _ in 0..3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.y.data, &FIRST[..8]);
        }

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_looping_empty_file_ends() {
        let path = write_clip("empty", "YUV4MPEG2 W4 H2 F30:1 C420\n", &[]);
        let mut source = Y4mSource::open(&path, None, true).unwrap();

        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let ended = source.next_frame().unwrap().is_none();
            let _ = sender.send(ended);
        });
        let ended = receiver
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("next_frame did not return");

        assert!(ended);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_fractional_rate_is_kept() {
        let path = write_clip("ntsc", "YUV4MPEG2 W4 H2 F30000:1001 C420\n", &[FIRST]);
        let source = Y4mSource::open(&path, None, false).unwrap();

        assert_eq!(
            source.pacer.interval(),
            std::time::Duration::from_nanos(33_366_666)
        );
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_rejects_oversized_frames() {
        let path = write_clip("huge", "YUV4MPEG2 W4100 H2 F30:1 C420\n", &[]);
        assert!(Y4mSource::open(&path, None, false).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_rejects_444() {
        let path = write_clip("444", "YUV4MPEG2 W4 H2 F30:1 C444\n", &[]);
        assert!(Y4mSource::open(&path, None, false).is_err());
        std::fs::remove_file(path).unwrap();
    }
}
