use annot_model::{Annotation, AnnotationKind, Color};

pub const UNDERLINE_EDGE_PX: f32 = 2.0;
pub const SIGNATURE_PREVIEW_WIDTH_PX: f32 = 128.0;
pub const SIGNATURE_PREVIEW_HEIGHT_PX: f32 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Screen-space bounding box for an annotation overlay. A negative height
/// (drag upward) anchors the box at the upper edge and keeps the extent
/// positive.
pub fn overlay_rect(annotation: &Annotation) -> OverlayRect {
    let height = annotation.height.unwrap_or(0.0);

    OverlayRect {
        left: annotation.x,
        top: annotation.y.min(annotation.y + height),
        width: annotation.width.unwrap_or(0.0),
        height: height.abs(),
    }
}

pub fn overlay_fill(annotation: &Annotation) -> Option<String> {
    if annotation.kind != AnnotationKind::Highlight {
        return None;
    }

    // "80" suffix = 50% alpha in #rrggbbaa notation.
    Some(format!("{}80", annotation.color.unwrap_or(Color::YELLOW).to_hex()))
}

pub fn underline_edge_color(annotation: &Annotation) -> Option<Color> {
    if annotation.kind != AnnotationKind::Underline {
        return None;
    }

    Some(annotation.color.unwrap_or(Color::BLACK))
}

/// Strip along the bottom edge of the overlay rect where the underline paints.
pub fn underline_edge_rect(annotation: &Annotation) -> Option<OverlayRect> {
    if annotation.kind != AnnotationKind::Underline {
        return None;
    }

    let rect = overlay_rect(annotation);

    Some(OverlayRect {
        left: rect.left,
        top: rect.top + rect.height - UNDERLINE_EDGE_PX,
        width: rect.width,
        height: UNDERLINE_EDGE_PX,
    })
}

pub fn comment_bubble_text(annotation: &Annotation) -> Option<&str> {
    if annotation.kind != AnnotationKind::Comment {
        return None;
    }

    annotation.text.as_deref()
}

pub fn signature_preview(annotation: &Annotation) -> Option<&str> {
    if annotation.kind != AnnotationKind::Signature {
        return None;
    }

    annotation.signature_image()
}

/// Fixed-size preview box for a signed signature annotation.
pub fn signature_preview_rect(annotation: &Annotation) -> Option<OverlayRect> {
    signature_preview(annotation)?;

    Some(OverlayRect {
        left: annotation.x,
        top: annotation.y,
        width: SIGNATURE_PREVIEW_WIDTH_PX,
        height: SIGNATURE_PREVIEW_HEIGHT_PX,
    })
}

pub fn fit_width_scale(viewport_width_px: f32, page_width_pt: f32) -> f32 {
    if viewport_width_px <= 0.0 || page_width_pt <= 0.0 {
        return 1.0;
    }

    (viewport_width_px / page_width_pt).clamp(0.1, 16.0)
}
