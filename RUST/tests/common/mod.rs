#![allow(dead_code)]

use simbrowse::*;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

pub const GRID_CSV: &str = "SimNum,A,B\n1,1,10\n2,1,20\n3,2,10\n4,2,20\n5,3,10\n6,3,20\n";

/// A batch folder on disk: parameter list plus one `<name>_<num>` run folder per row.
pub struct BatchFixture {
    pub dir: TempDir,
    pub folder: PathBuf,
}

impl BatchFixture {
    pub fn new(name: &str, csv: &str) -> Self {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("batch");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("parlist_sim.csv"), csv).unwrap();

        let rows = csv.lines().skip(1).filter(|l| !l.trim().is_empty()).count();
        for n in 1..=rows {
            std::fs::create_dir_all(folder.join(format!("{name}_{n:03}")).join("fig")).unwrap();
        }
        Self { dir, folder }
    }

    pub fn grid() -> Self {
        Self::new("wave", GRID_CSV)
    }

    pub fn path(&self) -> &Path {
        &self.folder
    }

    pub fn load(&self) -> BatchCatalog {
        BatchCatalog::load(&self.folder, &CatalogOptions::default()).unwrap()
    }

    pub fn session(&self) -> Session {
        Session::new(self.load(), NavigationController::default())
    }
}

pub fn scalar(v: f64) -> MatValue {
    MatValue::Numeric(NumericArray::scalar_f64(v))
}

pub fn text(s: &str) -> MatValue {
    MatValue::Char(CharArray::from_str_row(s))
}

pub fn record(fields: Vec<(&str, MatValue)>) -> MatValue {
    MatValue::Struct(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}
