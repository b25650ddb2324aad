//! Page images → single multi-page PDF.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::codecs::jpeg::JpegEncoder;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, ObjectId, Stream,
};

use crate::{errors::Error, Result};

pub const DEFAULT_IMAGE_EXTENSION: &str = "webp";

const JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvertOutcome {
    Written { pages: usize },
    /// Nothing matched the extension filter; no output file was created.
    NoImages,
}

/// Files in `folder` with the given extension (case-insensitive), sorted by name.
pub fn list_page_images(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension.trim_start_matches('.').to_lowercase());
    let mut names = Vec::new();
    for ent in fs::read_dir(folder)? {
        let ent = ent?;
        if !ent.file_type()?.is_file() {
            continue;
        }
        let name = ent.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(&suffix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names.into_iter().map(|n| folder.join(n)).collect())
}

/// Concatenate every page image of `folder` into one PDF at `output`.
///
/// The document is assembled in memory and written through a `.part` sibling,
/// so `output` either holds the complete document or does not exist.
pub fn images_to_pdf(folder: &Path, output: &Path, extension: &str) -> Result<ConvertOutcome> {
    let images = list_page_images(folder, extension)?;
    if images.is_empty() {
        return Ok(ConvertOutcome::NoImages);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in &images {
        let page_id = add_image_page(&mut doc, pages_id, path)?;
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| Error::External(format!("pdf serialization failed: {e}")))?;

    write_whole(output, &bytes)?;
    Ok(ConvertOutcome::Written {
        pages: images.len(),
    })
}

fn add_image_page(doc: &mut Document, pages_id: ObjectId, path: &Path) -> Result<ObjectId> {
    // Normalize every page to 8-bit RGB (drops alpha, expands grayscale/palette).
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));

    // One point per pixel (72 dpi), image fills the page.
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width as i64),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height as i64),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width as i64),
            Object::Integer(height as i64),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

fn write_whole(output: &Path, bytes: &[u8]) -> Result<()> {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    if let Err(e) = fs::write(&part, bytes).and_then(|()| fs::rename(&part, output)) {
        let _ = fs::remove_file(&part);
        return Err(Error::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::time::Duration;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    fn page_widths(pdf: &Path) -> Vec<i64> {
        let doc = Document::load(pdf).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
                media_box[2].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn pages_follow_filename_order() {
        let dir = tmp("jmpdf-convert-order");
        fs::create_dir_all(&dir).unwrap();
        // Widths tag the pages so order is observable in the output.
        RgbImage::from_pixel(30, 10, Rgb([200, 0, 0]))
            .save(dir.join("c.webp"))
            .unwrap();
        RgbImage::from_pixel(10, 10, Rgb([0, 200, 0]))
            .save(dir.join("a.webp"))
            .unwrap();
        RgbImage::from_pixel(20, 10, Rgb([0, 0, 200]))
            .save(dir.join("b.webp"))
            .unwrap();
        fs::write(dir.join("notes.txt"), b"not a page").unwrap();

        let out = dir.with_extension("pdf");
        let outcome = images_to_pdf(&dir, &out, "webp").unwrap();
        assert_eq!(outcome, ConvertOutcome::Written { pages: 3 });
        assert_eq!(page_widths(&out), vec![10, 20, 30]);

        let _ = fs::remove_file(&out);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn alpha_pages_are_flattened_to_rgb() {
        let dir = tmp("jmpdf-convert-alpha");
        fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128]))
            .save(dir.join("01.webp"))
            .unwrap();
        fs::rename(dir.join("01.webp"), dir.join("01.WEBP")).unwrap();

        let out = dir.with_extension("pdf");
        let outcome = images_to_pdf(&dir, &out, "webp").unwrap();
        assert_eq!(outcome, ConvertOutcome::Written { pages: 1 });
        assert!(out.exists());

        let _ = fs::remove_file(&out);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_matching_images_writes_nothing() {
        let dir = tmp("jmpdf-convert-empty");
        fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))
            .save(dir.join("cover.png"))
            .unwrap();

        let out = dir.with_extension("pdf");
        let outcome = images_to_pdf(&dir, &out, "webp").unwrap();
        assert_eq!(outcome, ConvertOutcome::NoImages);
        assert!(!out.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn undecodable_page_fails_without_output() {
        let dir = tmp("jmpdf-convert-broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.webp"), b"definitely not webp").unwrap();

        let out = dir.with_extension("pdf");
        assert!(images_to_pdf(&dir, &out, "webp").is_err());
        assert!(!out.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
