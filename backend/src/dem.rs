use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemLoadError {
    #[error("failed to open DEM file {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to read DEM data: {0}")]
    Read(#[source] std::io::Error),
    #[error("DEM file missing header field `{0}`")]
    MissingHeader(&'static str),
    #[error("DEM file has invalid numeric header for `{field}`: {source}")]
    InvalidHeader {
        field: &'static str,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("DEM file has invalid integer header for `{field}`: {source}")]
    InvalidHeaderInt {
        field: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("DEM cell {index} is not a number: {source}")]
    InvalidValue {
        index: usize,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("DEM grid must have a positive size and cell size")]
    EmptyGrid,
    #[error("DEM grid has {expected} cells but file provided {actual}")]
    UnexpectedCellCount { expected: usize, actual: usize },
}

/// ESRI ASCII grid in geographic coordinates: `x` is longitude, `y` is
/// latitude and `cellsize` is in degrees. Rows are stored north to south.
#[derive(Debug)]
pub struct ArcAsciiDem {
    ncols: usize,
    nrows: usize,
    /// Longitude of the center of the western column.
    west_center: f64,
    /// Latitude of the center of the northern row.
    north_center: f64,
    cellsize: f64,
    nodata: f64,
    values: Vec<f64>,
}

#[derive(Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x: Option<f64>,
    y: Option<f64>,
    centered: bool,
    cellsize: Option<f64>,
    nodata: Option<f64>,
}

impl ArcAsciiDem {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DemLoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DemLoadError::Io {
            source,
            path: path.into(),
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DemLoadError> {
        let mut reader = BufReader::new(reader);
        let mut header = Header::default();
        let mut line = String::new();
        let mut pending_values = String::new();

        // Header keys come first; the first line starting with a number is data.
        loop {
            line.clear();
            if reader.read_line(&mut line).map_err(DemLoadError::Read)? == 0 {
                break;
            }
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else {
                continue;
            };
            if key.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
                pending_values.push_str(&line);
                break;
            }
            let Some(value) = parts.next() else {
                continue;
            };
            header.apply(&key.to_lowercase(), value)?;
        }

        let ncols = header.ncols.ok_or(DemLoadError::MissingHeader("ncols"))?;
        let nrows = header.nrows.ok_or(DemLoadError::MissingHeader("nrows"))?;
        let x = header.x.ok_or(DemLoadError::MissingHeader("xllcorner"))?;
        let y = header.y.ok_or(DemLoadError::MissingHeader("yllcorner"))?;
        let cellsize = header.cellsize.ok_or(DemLoadError::MissingHeader("cellsize"))?;
        let nodata = header.nodata.unwrap_or(-9999.0);

        if ncols == 0 || nrows == 0 || !(cellsize > 0.0) {
            return Err(DemLoadError::EmptyGrid);
        }

        let half = if header.centered { 0.0 } else { cellsize / 2.0 };
        let west_center = x + half;
        let north_center = y + half + cellsize * ((nrows - 1) as f64);

        let mut rest = String::new();
        reader
            .read_to_string(&mut rest)
            .map_err(DemLoadError::Read)?;
        pending_values.push_str(&rest);

        let mut values = Vec::with_capacity(ncols * nrows);
        for (index, token) in pending_values.split_whitespace().enumerate() {
            let value = token
                .parse::<f64>()
                .map_err(|source| DemLoadError::InvalidValue { index, source })?;
            values.push(value);
        }

        let expected = ncols * nrows;
        if values.len() != expected {
            return Err(DemLoadError::UnexpectedCellCount {
                expected,
                actual: values.len(),
            });
        }

        Ok(Self {
            ncols,
            nrows,
            west_center,
            north_center,
            cellsize,
            nodata,
            values,
        })
    }

    /// Bilinear elevation at `(lat, lon)`, or `None` outside the grid or
    /// where every surrounding cell is nodata.
    pub fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        let col = (lon - self.west_center) / self.cellsize;
        let row = (self.north_center - lat) / self.cellsize;
        let max_col = (self.ncols - 1) as f64;
        let max_row = (self.nrows - 1) as f64;

        // Allow half a cell of slack at the edges, which still lies inside the grid.
        if !(-0.5..=max_col + 0.5).contains(&col) || !(-0.5..=max_row + 0.5).contains(&row) {
            return None;
        }
        let col = col.clamp(0.0, max_col);
        let row = row.clamp(0.0, max_row);

        let x0 = col.floor() as usize;
        let y0 = row.floor() as usize;
        let x1 = (x0 + 1).min(self.ncols - 1);
        let y1 = (y0 + 1).min(self.nrows - 1);

        let q11 = self.value(y0, x0);
        let q21 = self.value(y0, x1);
        let q12 = self.value(y1, x0);
        let q22 = self.value(y1, x1);

        let tx = col - x0 as f64;
        let ty = row - y0 as f64;

        match (q11, q21, q12, q22) {
            (Some(a), Some(b), Some(c), Some(d)) => {
                let top = a * (1.0 - tx) + b * tx;
                let bottom = c * (1.0 - tx) + d * tx;
                Some(top * (1.0 - ty) + bottom * ty)
            }
            _ => {
                let known: Vec<f64> = [q11, q21, q12, q22].into_iter().flatten().collect();
                if known.is_empty() {
                    None
                } else {
                    Some(known.iter().sum::<f64>() / known.len() as f64)
                }
            }
        }
    }

    fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        let value = self.values.get(row * self.ncols + col).copied()?;
        if (value - self.nodata).abs() < f64::EPSILON {
            None
        } else {
            Some(value)
        }
    }
}

impl Header {
    fn apply(&mut self, key: &str, value: &str) -> Result<(), DemLoadError> {
        let float = |field: &'static str| {
            value
                .parse::<f64>()
                .map_err(|source| DemLoadError::InvalidHeader { field, source })
        };
        let int = |field: &'static str| {
            value
                .parse::<usize>()
                .map_err(|source| DemLoadError::InvalidHeaderInt { field, source })
        };

        match key {
            "ncols" => self.ncols = Some(int("ncols")?),
            "nrows" => self.nrows = Some(int("nrows")?),
            "xllcorner" => self.x = Some(float("xllcorner")?),
            "yllcorner" => self.y = Some(float("yllcorner")?),
            "xllcenter" => {
                self.x = Some(float("xllcenter")?);
                self.centered = true;
            }
            "yllcenter" => {
                self.y = Some(float("yllcenter")?);
                self.centered = true;
            }
            "cellsize" => self.cellsize = Some(float("cellsize")?),
            "nodata_value" => self.nodata = Some(float("nodata_value")?),
            _ => {}
        }
        Ok(())
    }
}
