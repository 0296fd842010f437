//! Random content generator.
//!
//! Produces line files for tests and benchmarks of the sorter. Lines consist of random characters in
//! the `[a-z]` range and are all of the same length.

use std::io::{self, prelude::*};

use bytesize::ByteSize;
use log;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::lifecycle::{self, ScratchDir, ScratchStorage, TempArtifact};

/// Generated content may take at most this share of the usable scratch space.
pub const SPACE_FRACTION: u64 = 3;

/// Random line file generator.
pub struct RandomContentGenerator {
    scratch: Box<dyn ScratchStorage>,
    seed: Option<u64>,
}

impl RandomContentGenerator {
    /// Creates a generator writing to the OS temporary directory.
    pub fn new() -> Self {
        RandomContentGenerator::with_scratch(ScratchDir::default())
    }

    /// Creates a generator writing to the given scratch storage.
    pub fn with_scratch(scratch: impl ScratchStorage + 'static) -> Self {
        RandomContentGenerator {
            scratch: Box::new(scratch),
            seed: None,
        }
    }

    /// Makes the generated content reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        return self;
    }

    /// Generates a file of `line_count` lines, each `line_length` characters long.
    ///
    /// Fails without creating a file if `line_length` is negative or the file would take more than
    /// a third of the usable scratch space.
    pub fn generate(&self, line_count: u64, line_length: i64) -> Result<TempArtifact> {
        if line_length < 0 {
            return Err(Error::configuration(format!(
                "line length must not be negative, got {}",
                line_length
            )));
        }
        let line_length = line_length as u64;

        let required = line_count.checked_mul(line_length + 1).unwrap_or(u64::MAX);
        match self.scratch.usable_space() {
            Some(available) if required > available / SPACE_FRACTION => {
                log::error!(
                    "{} of content is too large for {} of usable scratch space",
                    ByteSize(required),
                    ByteSize(available)
                );
                return Err(Error::ResourceExhaustion { required, available });
            }
            Some(_) => {}
            None => log::warn!(
                "usable space of {} unknown, generating without a space check",
                self.scratch.dir().display()
            ),
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (file, path) = lifecycle::create_temp(self.scratch.dir(), "generated-")
            .map_err(Error::TempDir)?
            .into_parts();
        let mut writer = io::BufWriter::new(file);

        log::info!(
            "generating {} lines of {} characters into {}",
            line_count,
            line_length,
            path.display()
        );
        // on error `path` is dropped and the partial file goes with it
        write_lines(&mut writer, &mut rng, line_count, line_length)?;
        drop(writer);

        return Ok(TempArtifact::new(path, line_count));
    }
}

impl Default for RandomContentGenerator {
    fn default() -> Self {
        RandomContentGenerator::new()
    }
}

/// Letters are written in blocks of this size, so memory use does not depend on the line length.
const BLOCK_SIZE: u64 = 8 * 1024;

fn write_lines<W: Write, R: Rng>(writer: &mut W, rng: &mut R, line_count: u64, line_length: u64) -> io::Result<()> {
    let letters = Uniform::new_inclusive(b'a', b'z');
    let mut block = Vec::with_capacity(BLOCK_SIZE.min(line_length) as usize);

    for _ in 0..line_count {
        let mut remaining = line_length;
        while remaining > 0 {
            let len = BLOCK_SIZE.min(remaining);
            block.clear();
            block.extend((0..len).map(|_| rng.sample(letters)));
            writer.write_all(&block)?;
            remaining -= len;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    return Ok(());
}
