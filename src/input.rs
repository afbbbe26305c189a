use std::{ io, fs, path::{Path, PathBuf} };
use log::info;

use thiserror::Error;



///
/// Errors which may occur when loading `InputData`.
///
#[derive(Error, Debug)]
pub enum InputError
{
        #[error("could not read {path:?}: {source}")]
        Io
        {
            source: io::Error,
            path:   PathBuf,
        },
}



///
/// The three textual artifacts the analysis consumes: the disassembly
/// listing (`avr-objdump -d`), the per-function stack-usage listing
/// (GCC `-fstack-usage`, one or more `.su` files concatenated) and the
/// section-size summary (`avr-size`).
///
#[derive(Clone, Debug)]
pub struct InputData
{
    pub asm_path:  PathBuf,
    pub asm_text:  String,
    pub su_path:   PathBuf,
    pub su_text:   String,
    pub size_path: PathBuf,
    pub size_text: String,
}

impl InputData
{
    /// Artifacts already in memory; used by tests and by front ends
    /// that pipe the toolchain output straight in.
    pub fn from_strings(asm_text: &str, su_text: &str, size_text: &str) -> Self
    {
        InputData
        {
            asm_path:  PathBuf::new(),
            asm_text:  asm_text.to_string(),
            su_path:   PathBuf::new(),
            su_text:   su_text.to_string(),
            size_path: PathBuf::new(),
            size_text: size_text.to_string(),
        }
    }
}

///
/// Loads the three artifacts from disk. A missing or unreadable file is
/// fatal here; everything recoverable happens later, line by line, in
/// the per-artifact parsers.
///
pub fn load_artifact_files(asm_fp: &Path, su_fp: &Path, size_fp: &Path)
    -> Result<InputData, InputError>
{
    let read = |p: &Path| -> Result<String, InputError>
    {
        fs::read_to_string(p).map_err(|e| InputError::Io
        {
            source: e,
            path:   p.to_path_buf(),
        })
    };

    let asm_text = read(asm_fp)?;
    let su_text = read(su_fp)?;
    let size_text = read(size_fp)?;

    info!(
        "loaded artifacts: {} bytes disassembly, {} bytes stack-usage, {} bytes size summary",
        asm_text.len(), su_text.len(), size_text.len()
    );

    Ok(InputData
    {
        asm_path:  asm_fp.to_path_buf(),
        asm_text,
        su_path:   su_fp.to_path_buf(),
        su_text,
        size_path: size_fp.to_path_buf(),
        size_text,
    })
}
