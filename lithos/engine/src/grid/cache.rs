//! Binary cache read/write for `Grid`.
//!
//! Large grids take a noticeable moment to build; the runner can persist one and reload it
//! on the next start. The cache is little-endian and versioned.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use smallvec::SmallVec;

use super::Grid;

/// Errors related to grid cache I/O.
#[derive(thiserror::Error, Debug)]
pub enum GridError {
    /// Wrapper for standard I/O errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Cache file has wrong magic or version
    #[error("bad magic or version")]
    BadHeader,
    /// Unexpected data length or out-of-range index
    #[error("unexpected data length")]
    BadLength,
}

const MAGIC: &[u8; 10] = b"LITHOGRID\0";
const VERSION: u32 = 2;

impl Grid {
    /// Save grid to a compact little-endian binary cache.
    pub fn save_cache<P: AsRef<Path>>(&self, path: P) -> Result<(), GridError> {
        let mut f = BufWriter::new(File::create(path)?);
        f.write_all(MAGIC)?;
        f.write_all(&VERSION.to_le_bytes())?;
        f.write_all(&self.frequency.to_le_bytes())?;
        f.write_all(&(self.cells as u32).to_le_bytes())?;
        f.write_all(&(self.triangles.len() as u32).to_le_bytes())?;
        f.write_all(&self.field_diameter.to_le_bytes())?;

        for p in &self.pos_xyz {
            for v in p {
                f.write_all(&v.to_le_bytes())?;
            }
        }
        for a in &self.latlon {
            for v in a {
                f.write_all(&v.to_le_bytes())?;
            }
        }
        for a in &self.area {
            f.write_all(&a.to_le_bytes())?;
        }
        // n1 with u8 length prefix per cell
        for neigh in &self.n1 {
            let len = u8::try_from(neigh.len()).map_err(|_| GridError::BadLength)?;
            f.write_all(&[len])?;
            for &idx in neigh {
                f.write_all(&idx.to_le_bytes())?;
            }
        }
        for t in &self.triangles {
            for &idx in t {
                f.write_all(&idx.to_le_bytes())?;
            }
        }
        f.flush()?;
        Ok(())
    }

    /// Load grid from a binary cache file.
    pub fn load_cache<P: AsRef<Path>>(path: P) -> Result<Self, GridError> {
        let mut f = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 10];
        f.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(GridError::BadHeader);
        }
        if read_u32(&mut f)? != VERSION {
            return Err(GridError::BadHeader);
        }
        let frequency = read_u32(&mut f)?;
        let cells = read_u32(&mut f)? as usize;
        let n_tris = read_u32(&mut f)? as usize;
        if cells != 10 * (frequency as usize).pow(2) + 2 || n_tris != 2 * cells - 4 {
            return Err(GridError::BadLength);
        }
        let field_diameter = read_f64(&mut f)?;

        let mut pos_xyz = vec![[0f64; 3]; cells];
        for p in &mut pos_xyz {
            for v in p.iter_mut() {
                *v = read_f64(&mut f)?;
            }
        }
        let mut latlon = vec![[0f64; 2]; cells];
        for a in &mut latlon {
            for v in a.iter_mut() {
                *v = read_f64(&mut f)?;
            }
        }
        let mut area = vec![0f64; cells];
        for a in &mut area {
            *a = read_f64(&mut f)?;
        }
        let mut n1 = Vec::with_capacity(cells);
        for _ in 0..cells {
            let mut len = [0u8; 1];
            f.read_exact(&mut len)?;
            let mut v = SmallVec::<[u32; 6]>::new();
            for _ in 0..len[0] {
                let idx = read_u32(&mut f)?;
                if idx as usize >= cells {
                    return Err(GridError::BadLength);
                }
                v.push(idx);
            }
            n1.push(v);
        }
        let mut triangles = vec![[0u32; 3]; n_tris];
        for t in &mut triangles {
            for idx in t.iter_mut() {
                *idx = read_u32(&mut f)?;
                if *idx as usize >= cells {
                    return Err(GridError::BadLength);
                }
            }
        }

        Ok(Self { frequency, cells, pos_xyz, latlon, area, n1, triangles, field_diameter })
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, GridError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64, GridError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(f64::from_le_bytes(b))
}
