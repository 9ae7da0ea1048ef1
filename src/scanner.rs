use crate::error::MetadataError;
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// PNG file signature (first 8 bytes of any valid PNG)
const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const PNG_READER_CAPACITY: usize = 128 * 1024;
const HASH_READER_CAPACITY: usize = 256 * 1024;
/// Largest chunk length a PNG may declare (2^31 - 1).
const PNG_MAX_CHUNK_LENGTH: u32 = i32::MAX as u32;
/// Text chunk holding the API-format workflow graph.
pub const PROMPT_CHUNK_KEY: &str = "prompt";

/// Image extensions accepted as loader inputs.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "avif", "gif", "jxl"];

/// The three PNG chunk types that can carry text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextChunkKind {
    Plain,
    Compressed,
    International,
}

impl TextChunkKind {
    fn from_tag(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"tEXt" => Some(Self::Plain),
            b"zTXt" => Some(Self::Compressed),
            b"iTXt" => Some(Self::International),
            _ => None,
        }
    }

    /// Splits a chunk body into `(keyword, text)`. Malformed bodies yield `None`.
    fn decode(self, data: &[u8]) -> Option<(String, String)> {
        let (keyword, body) = split_keyword(data)?;
        let text = match self {
            Self::Plain => String::from_utf8(body.to_vec()).ok()?,
            Self::Compressed => {
                let (&method, payload) = body.split_first()?;
                if method != 0 {
                    return None;
                }
                inflate_to_string(payload)?
            }
            Self::International => decode_international(body)?,
        };
        Some((keyword, text))
    }
}

fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    let keyword = String::from_utf8(data[..nul].to_vec()).ok()?;
    Some((keyword, &data[nul + 1..]))
}

/// `iTXt` body: compression flag, method, language tag, translated keyword, text.
fn decode_international(body: &[u8]) -> Option<String> {
    let [flag, method, rest @ ..] = body else {
        return None;
    };
    let language_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[language_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0)?;
    let text = &rest[translated_end + 1..];

    match (*flag, *method) {
        (0, _) => String::from_utf8(text.to_vec()).ok(),
        (1, 0) => inflate_to_string(text),
        _ => None,
    }
}

fn inflate_to_string(data: &[u8]) -> Option<String> {
    let mut output = String::new();
    ZlibDecoder::new(data).read_to_string(&mut output).ok()?;
    Some(output)
}

/// Reads every PNG text chunk into a keyword -> text map.
///
/// Pixel data is never decoded; non-text chunks are skipped by seeking past them.
pub fn extract_text_chunks(path: &Path) -> Result<HashMap<String, String>, MetadataError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(PNG_READER_CAPACITY, file);

    let mut signature = [0u8; 8];
    reader.read_exact(&mut signature)?;
    if signature != PNG_SIGNATURE {
        return Err(MetadataError::Png(format!(
            "Not a valid PNG file: {}",
            path.display()
        )));
    }

    let mut chunks = HashMap::new();
    loop {
        // A truncated trailer ends the walk; whatever was read so far is kept.
        let Ok(length) = reader.read_u32::<BigEndian>() else {
            break;
        };
        if length > PNG_MAX_CHUNK_LENGTH {
            return Err(MetadataError::Png(format!(
                "Chunk length {} exceeds PNG limit in {}",
                length,
                path.display()
            )));
        }
        let mut tag = [0u8; 4];
        if reader.read_exact(&mut tag).is_err() || &tag == b"IEND" {
            break;
        }

        match TextChunkKind::from_tag(&tag) {
            Some(kind) => {
                // Grows with the bytes actually present, not the declared length.
                let mut data = Vec::new();
                (&mut reader).take(u64::from(length)).read_to_end(&mut data)?;
                if data.len() < length as usize {
                    log::debug!("Truncated {:?} chunk in {}", kind, path.display());
                    break;
                }
                reader.seek(SeekFrom::Current(4))?; // CRC
                match kind.decode(&data) {
                    Some((keyword, text)) => {
                        chunks.insert(keyword, text);
                    }
                    None => log::debug!(
                        "Skipping malformed {:?} chunk in {}",
                        kind,
                        path.display()
                    ),
                }
            }
            None => {
                reader.seek(SeekFrom::Current(i64::from(length) + 4))?;
            }
        }
    }

    Ok(chunks)
}

/// Returns the embedded workflow graph text (`prompt` chunk) of a PNG file.
///
/// Other formats, and PNGs without a non-blank prompt chunk, yield `None`.
pub fn extract_prompt_metadata(path: &Path) -> Result<Option<String>, MetadataError> {
    if !has_extension(path, "png") {
        return Ok(None);
    }
    let mut chunks = extract_text_chunks(path)?;
    Ok(chunks
        .remove(PROMPT_CHUNK_KEY)
        .filter(|value| !value.trim().is_empty()))
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

pub fn is_supported_image(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|extension| has_extension(path, extension))
}

/// SHA-256 of the whole file, lowercase hex. Used to detect changed inputs.
pub fn compute_content_hash(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_READER_CAPACITY, file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push(HEX[(byte >> 4) as usize] as char);
        output.push(HEX[(byte & 0x0f) as usize] as char);
    }
    output
}

/// Lists loadable image files directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into. A missing directory lists as empty.
pub fn list_input_images(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_supported_image(entry.path()))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
