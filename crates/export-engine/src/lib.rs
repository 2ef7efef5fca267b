use annot_model::{Annotation, AnnotationKind, Color};
use base64::{engine::general_purpose, Engine as _};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

mod helvetica;

const HIGHLIGHT_ALPHA_NAME: &str = "GS1";
const COMMENT_ALPHA_NAME: &str = "GS2";
const COMMENT_FONT_NAME: &str = "Helv";
const COMMENT_FONT_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("signature image rejected: {0}")]
    SignatureImage(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Document access plus annotation export behind one seam. `open` validates
/// eagerly; `export_annotated` is pure with respect to the stored bytes and
/// returns a freshly serialized document.
pub trait DocumentBackend {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, ExportError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, ExportError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, ExportError>;
    fn export_annotated(
        &self,
        handle: DocumentHandle,
        annotations: &[Annotation],
    ) -> Result<Vec<u8>, ExportError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), ExportError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Vec<u8>,
    page_sizes: Vec<PageSize>,
}

#[derive(Debug, Default)]
pub struct LopdfBackend {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, ExportError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(ExportError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            sizes.push(page_size_of(&doc, object_id));
        }

        if sizes.is_empty() {
            return Err(ExportError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, ExportError> {
        self.docs.get(&handle).ok_or(ExportError::InvalidHandle(handle.raw()))
    }
}

impl DocumentBackend for LopdfBackend {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, ExportError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, DocumentRecord { bytes, page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, ExportError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, ExportError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(ExportError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn export_annotated(
        &self,
        handle: DocumentHandle,
        annotations: &[Annotation],
    ) -> Result<Vec<u8>, ExportError> {
        let record = self.record(handle)?;
        draw_annotations(&record.bytes, annotations)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), ExportError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(ExportError::InvalidHandle(handle.raw()))
    }
}

pub fn default_backend() -> LopdfBackend {
    LopdfBackend::new()
}

fn page_size_of(doc: &Document, page_id: ObjectId) -> PageSize {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(|object| object.as_dict()) else {
            break;
        };
        if let Some(size) = media_box_size(doc, dict) {
            return size;
        }
        current = dict.get(b"Parent").and_then(|parent| parent.as_reference()).ok();
    }

    log::warn!("page {page_id:?} has no usable MediaBox, assuming US Letter");
    PageSize { width_pt: 612.0, height_pt: 792.0 }
}

fn media_box_size(doc: &Document, dict: &lopdf::Dictionary) -> Option<PageSize> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let array = resolved.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = number_pt(&array[0])?;
    let y0 = number_pt(&array[1])?;
    let x1 = number_pt(&array[2])?;
    let y1 = number_pt(&array[3])?;

    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

fn number_pt(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

#[derive(Default)]
struct SharedResources {
    highlight_alpha: Option<ObjectId>,
    comment_alpha: Option<ObjectId>,
    helvetica: Option<ObjectId>,
}

impl SharedResources {
    fn ensure_highlight_alpha(&mut self, doc: &mut Document) -> ObjectId {
        *self.highlight_alpha.get_or_insert_with(|| {
            doc.add_object(dictionary! { "Type" => "ExtGState", "ca" => 0.4_f32 })
        })
    }

    fn ensure_comment_alpha(&mut self, doc: &mut Document) -> ObjectId {
        *self.comment_alpha.get_or_insert_with(|| {
            doc.add_object(dictionary! { "Type" => "ExtGState", "ca" => 0.8_f32 })
        })
    }

    fn ensure_helvetica(&mut self, doc: &mut Document) -> ObjectId {
        *self.helvetica.get_or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        })
    }
}

fn draw_annotations(bytes: &[u8], annotations: &[Annotation]) -> Result<Vec<u8>, ExportError> {
    let mut doc = Document::load_mem(bytes)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let heights: Vec<f32> =
        page_ids.iter().map(|page_id| page_size_of(&doc, *page_id).height_pt).collect();

    let mut page_ops: HashMap<ObjectId, Vec<Operation>> = HashMap::new();
    let mut resources = SharedResources::default();
    let mut signature_count = 0u32;

    for annotation in annotations {
        let slot = annotation.page.checked_sub(1).and_then(|index| {
            page_ids.get(index as usize).map(|page_id| (*page_id, heights[index as usize]))
        });
        let Some((page_id, page_height)) = slot else {
            log::debug!(
                "skipping {:?} annotation on page {}, document has {} pages",
                annotation.kind,
                annotation.page,
                page_ids.len()
            );
            continue;
        };

        match annotation.kind {
            AnnotationKind::Highlight => {
                let state_id = resources.ensure_highlight_alpha(&mut doc);
                add_page_resource(&mut doc, page_id, "ExtGState", HIGHLIGHT_ALPHA_NAME, state_id)?;
                push_highlight_ops(page_ops.entry(page_id).or_default(), annotation, page_height);
            }
            AnnotationKind::Underline => {
                push_underline_ops(page_ops.entry(page_id).or_default(), annotation, page_height);
            }
            AnnotationKind::Comment => {
                let state_id = resources.ensure_comment_alpha(&mut doc);
                add_page_resource(&mut doc, page_id, "ExtGState", COMMENT_ALPHA_NAME, state_id)?;
                let font_id = resources.ensure_helvetica(&mut doc);
                add_page_resource(&mut doc, page_id, "Font", COMMENT_FONT_NAME, font_id)?;
                push_comment_ops(page_ops.entry(page_id).or_default(), annotation, page_height);
            }
            AnnotationKind::Signature => {
                let Some(data) = annotation.signature_image() else {
                    log::debug!("skipping signature annotation without image data");
                    continue;
                };

                let image_id = embed_signature_image(&mut doc, data)?;
                signature_count += 1;
                let name = format!("ImSig{signature_count}");
                add_page_resource(&mut doc, page_id, "XObject", &name, image_id)?;
                push_signature_ops(page_ops.entry(page_id).or_default(), &name, annotation, page_height);
            }
        }
    }

    for page_id in &page_ids {
        let Some(operations) = page_ops.remove(page_id) else {
            continue;
        };
        let encoded = Content { operations }.encode()?;
        doc.add_page_contents(*page_id, encoded)?;
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;

    Ok(buffer)
}

fn push_highlight_ops(ops: &mut Vec<Operation>, annotation: &Annotation, page_height: f32) {
    let width = annotation.width.unwrap_or(100.0);
    let height = annotation.height.unwrap_or(20.0);
    let (r, g, b) = annotation.color.unwrap_or(Color::YELLOW).to_normalized();
    let y = page_height - annotation.y - height;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("gs", vec![HIGHLIGHT_ALPHA_NAME.into()]));
    ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    ops.push(Operation::new(
        "re",
        vec![annotation.x.into(), y.into(), width.into(), height.into()],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn push_underline_ops(ops: &mut Vec<Operation>, annotation: &Annotation, page_height: f32) {
    let width = annotation.width.unwrap_or(100.0);
    let height = annotation.height.unwrap_or(2.0);
    let (r, g, b) = annotation.color.unwrap_or(Color::BLACK).to_normalized();
    // The stroke sits a fixed 4 units below the anchored line position.
    let y = page_height - annotation.y - height - 4.0;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("RG", vec![r.into(), g.into(), b.into()]));
    ops.push(Operation::new("w", vec![2.0.into()]));
    ops.push(Operation::new("m", vec![annotation.x.into(), y.into()]));
    ops.push(Operation::new("l", vec![(annotation.x + width).into(), y.into()]));
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn push_comment_ops(ops: &mut Vec<Operation>, annotation: &Annotation, page_height: f32) {
    let text = annotation.text.as_deref().unwrap_or("");
    let text_width = helvetica::text_width(text, COMMENT_FONT_SIZE);
    let text_height = helvetica::line_height(COMMENT_FONT_SIZE);
    let (r, g, b) = annotation.color.unwrap_or(Color::BLACK).to_normalized();
    let (bg_r, bg_g, bg_b) = Color::LIGHT_YELLOW.to_normalized();
    let box_y = page_height - annotation.y - text_height - 4.0;
    let baseline_y = page_height - annotation.y - text_height - 2.0;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("gs", vec![COMMENT_ALPHA_NAME.into()]));
    ops.push(Operation::new("rg", vec![bg_r.into(), bg_g.into(), bg_b.into()]));
    ops.push(Operation::new(
        "re",
        vec![
            annotation.x.into(),
            box_y.into(),
            (text_width + 8.0).into(),
            (text_height + 4.0).into(),
        ],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![COMMENT_FONT_NAME.into(), COMMENT_FONT_SIZE.into()]));
    ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    ops.push(Operation::new("Td", vec![(annotation.x + 4.0).into(), baseline_y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(helvetica::encode_win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn push_signature_ops(
    ops: &mut Vec<Operation>,
    name: &str,
    annotation: &Annotation,
    page_height: f32,
) {
    let y = page_height - annotation.y - 64.0;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![128.0.into(), 0.0.into(), 0.0.into(), 64.0.into(), annotation.x.into(), y.into()],
    ));
    ops.push(Operation::new("Do", vec![name.into()]));
    ops.push(Operation::new("Q", vec![]));
}

fn signature_payload(data: &str) -> &str {
    match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    }
}

fn embed_signature_image(doc: &mut Document, data: &str) -> Result<ObjectId, ExportError> {
    let decoded = general_purpose::STANDARD
        .decode(signature_payload(data).as_bytes())
        .map_err(|err| ExportError::SignatureImage(format!("base64 decode failed: {err}")))?;
    let rgba = image::load_from_memory(&decoded)
        .map_err(|err| ExportError::SignatureImage(format!("image decode failed: {err}")))?
        .to_rgba8();

    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.push(pixel[0]);
        rgb.push(pixel[1]);
        rgb.push(pixel[2]);
        alpha.push(pixel[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        alpha,
    ));

    Ok(doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "SMask" => smask_id,
        },
        rgb,
    )))
}

fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    value: ObjectId,
) -> Result<(), ExportError> {
    let own = doc.get_object(page_id)?.as_dict()?.get(b"Resources").ok().cloned();

    match own {
        // Shared resources object; grow it in place so every page that
        // references it keeps resolving the same names.
        Some(Object::Reference(id)) => {
            let shared = doc
                .get_object(id)
                .ok()
                .and_then(|object| object.as_dict().ok())
                .ok_or_else(|| {
                    ExportError::Backend("page Resources is not a dictionary".to_owned())
                })?;
            let mut entries = resolved_category(doc, shared, category)?;
            entries.set(name, value);

            doc.get_object_mut(id)?.as_dict_mut()?.set(category, Object::Dictionary(entries));
        }
        Some(Object::Dictionary(mut resources)) => {
            let mut entries = resolved_category(doc, &resources, category)?;
            entries.set(name, value);
            resources.set(category, Object::Dictionary(entries));

            let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page_dict.set("Resources", Object::Dictionary(resources));
        }
        // No own entry; shadowing the parent must not lose its names, so
        // the page gets a copy of the inherited dictionary.
        None => {
            let mut resources = inherited_resources(doc, page_id).unwrap_or_else(|| dictionary! {});
            let mut entries = resolved_category(doc, &resources, category)?;
            entries.set(name, value);
            resources.set(category, Object::Dictionary(entries));

            let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page_dict.set("Resources", Object::Dictionary(resources));
        }
        Some(_) => {
            return Err(ExportError::Backend("page Resources is not a dictionary".to_owned()));
        }
    }

    Ok(())
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Option<lopdf::Dictionary> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(|object| object.as_dict()) else {
            return None;
        };
        if let Ok(raw) = dict.get(b"Resources") {
            let resolved = match raw {
                Object::Reference(id) => doc.get_object(*id).ok()?,
                other => other,
            };
            return resolved.as_dict().ok().cloned();
        }
        current = dict.get(b"Parent").and_then(|parent| parent.as_reference()).ok();
    }

    None
}

/// Existing category entries survive: a referenced category dictionary is
/// resolved and copied before the new name lands next to the old ones.
fn resolved_category(
    doc: &Document,
    resources: &lopdf::Dictionary,
    category: &str,
) -> Result<lopdf::Dictionary, ExportError> {
    let not_a_dict =
        || ExportError::Backend(format!("page resource entry {category} is not a dictionary"));

    match resources.get(category.as_bytes()) {
        Err(_) => Ok(dictionary! {}),
        Ok(Object::Dictionary(entries)) => Ok(entries.clone()),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .ok_or_else(not_a_dict),
        Ok(_) => Err(not_a_dict()),
    }
}
