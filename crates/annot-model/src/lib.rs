use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("expected #rrggbb hex color, got {0:?}")]
    InvalidHex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0 };
    pub const LIGHT_YELLOW: Color = Color { r: 255, g: 255, b: 153 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse_hex(value: &str) -> Result<Self, ColorParseError> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ColorParseError::InvalidHex(value.to_owned()));
        }

        let channel = |start: usize| u8::from_str_radix(&digits[start..start + 2], 16);
        match (channel(0), channel(2), channel(4)) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Self { r, g, b }),
            _ => Err(ColorParseError::InvalidHex(value.to_owned())),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_normalized(self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Highlight,
    Underline,
    Comment,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub page: u32,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_data: Option<String>,
}

impl Annotation {
    pub fn draft(kind: AnnotationKind, page: u32, x: f32, y: f32, color: Option<Color>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            page,
            x,
            y,
            width: None,
            height: None,
            text: None,
            color,
            signature_data: None,
        }
    }

    pub fn signature_placeholder(page: u32, x: f32, y: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: AnnotationKind::Signature,
            page,
            x,
            y,
            width: None,
            height: None,
            text: None,
            color: None,
            signature_data: Some(String::new()),
        }
    }

    pub fn signature_image(&self) -> Option<&str> {
        self.signature_data.as_deref().filter(|data| !data.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub default_color: Color,
    pub export_filename: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { default_color: Color::YELLOW, export_filename: "annotated.pdf".to_owned() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorSession {
    pub tool: Option<AnnotationKind>,
    pub active_color: Color,
    pub annotations: Vec<Annotation>,
    draft: Option<Uuid>,
    pending_comment: Option<Uuid>,
}

impl Default for AnnotatorSession {
    fn default() -> Self {
        Self {
            tool: None,
            active_color: Color::YELLOW,
            annotations: Vec::new(),
            draft: None,
            pending_comment: None,
        }
    }
}

impl AnnotatorSession {
    pub fn annotation(&self, id: Uuid) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    pub fn live_draft(&self) -> Option<&Annotation> {
        self.draft.and_then(|id| self.annotation(id))
    }

    pub fn awaiting_comment_text(&self) -> Option<Uuid> {
        self.pending_comment
    }

    fn annotation_mut(&mut self, id: Uuid) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|annotation| annotation.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotatorAction {
    SelectTool { tool: Option<AnnotationKind> },
    SetActiveColor { color: Color },
    PointerDown { page: u32, x: f32, y: f32 },
    PointerUp { x: f32 },
    SubmitCommentText { text: String },
    CancelCommentText,
    AttachSignatureData { id: Uuid, data: String },
    RemoveAnnotation { id: Uuid },
    LoadDocument,
}

/// Applies one interaction event to the session and returns the id of the
/// annotation finalized by it, if any. Highlights and underlines finalize at
/// pointer-up; comments finalize once their text is submitted or cancelled.
pub fn apply_annotator_action(
    state: &mut AnnotatorSession,
    action: AnnotatorAction,
) -> Option<Uuid> {
    match action {
        AnnotatorAction::SelectTool { tool } => {
            let finalized = resolve_pending_comment(state, String::new());
            abandon_draft(state);
            state.tool = tool;
            finalized
        }
        AnnotatorAction::SetActiveColor { color } => {
            state.active_color = color;
            None
        }
        AnnotatorAction::PointerDown { page, x, y } => {
            if state.pending_comment.is_some() {
                return None;
            }
            let Some(tool) = state.tool else {
                return None;
            };

            if tool == AnnotationKind::Signature {
                state.annotations.push(Annotation::signature_placeholder(page, x, y));
                return None;
            }

            abandon_draft(state);
            let color = (tool != AnnotationKind::Comment).then_some(state.active_color);
            let annotation = Annotation::draft(tool, page, x, y, color);
            state.draft = Some(annotation.id);
            state.annotations.push(annotation);
            None
        }
        AnnotatorAction::PointerUp { x } => {
            if state.pending_comment.is_some() {
                return None;
            }
            let Some(tool) = state.tool else {
                return None;
            };
            if tool == AnnotationKind::Signature {
                return None;
            }
            let Some(draft_id) = state.draft.take() else {
                return None;
            };
            let Some(draft) = state.annotation_mut(draft_id) else {
                return None;
            };

            draft.width = Some((x - draft.x).abs());
            draft.height = Some(if tool == AnnotationKind::Highlight { 20.0 } else { 10.0 });

            if tool == AnnotationKind::Comment {
                state.pending_comment = Some(draft_id);
                return None;
            }

            state.tool = None;
            Some(draft_id)
        }
        AnnotatorAction::SubmitCommentText { text } => {
            let finalized = resolve_pending_comment(state, text);
            if finalized.is_some() {
                state.tool = None;
            }
            finalized
        }
        AnnotatorAction::CancelCommentText => {
            let finalized = resolve_pending_comment(state, String::new());
            if finalized.is_some() {
                state.tool = None;
            }
            finalized
        }
        AnnotatorAction::AttachSignatureData { id, data } => {
            if let Some(annotation) = state.annotation_mut(id) {
                if annotation.kind == AnnotationKind::Signature {
                    annotation.signature_data = Some(data);
                }
            }
            None
        }
        AnnotatorAction::RemoveAnnotation { id } => {
            state.annotations.retain(|annotation| annotation.id != id);
            if state.draft == Some(id) {
                state.draft = None;
            }
            if state.pending_comment == Some(id) {
                state.pending_comment = None;
            }
            None
        }
        AnnotatorAction::LoadDocument => {
            state.annotations.clear();
            state.tool = None;
            state.draft = None;
            state.pending_comment = None;
            None
        }
    }
}

fn abandon_draft(state: &mut AnnotatorSession) {
    let Some(id) = state.draft.take() else {
        return;
    };
    state.annotations.retain(|annotation| annotation.id != id);
}

fn resolve_pending_comment(state: &mut AnnotatorSession, text: String) -> Option<Uuid> {
    let id = state.pending_comment.take()?;
    let annotation = state.annotation_mut(id)?;
    annotation.text = Some(text);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_tool(tool: AnnotationKind) -> AnnotatorSession {
        let mut state = AnnotatorSession::default();
        apply_annotator_action(&mut state, AnnotatorAction::SelectTool { tool: Some(tool) });
        state
    }

    #[test]
    fn pointer_down_without_tool_is_ignored() {
        let mut state = AnnotatorSession::default();
        let finalized = apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 10.0 },
        );

        assert_eq!(finalized, None);
        assert!(state.annotations.is_empty());
    }

    #[test]
    fn highlight_finalization_replaces_draft_in_place() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 10.0 },
        );
        let draft_id = state.live_draft().expect("draft expected").id;

        let finalized = apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 50.0 });

        assert_eq!(finalized, Some(draft_id));
        assert_eq!(state.annotations.len(), 1);
        let annotation = &state.annotations[0];
        assert_eq!(annotation.id, draft_id);
        assert_eq!(annotation.page, 1);
        assert_eq!(annotation.width, Some(40.0));
        assert_eq!(annotation.height, Some(20.0));
        assert_eq!(state.tool, None);
    }

    #[test]
    fn underline_finalizes_with_height_ten() {
        let mut state = session_with_tool(AnnotationKind::Underline);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 2, x: 100.0, y: 30.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 40.0 });

        let annotation = &state.annotations[0];
        assert_eq!(annotation.width, Some(60.0));
        assert_eq!(annotation.height, Some(10.0));
        assert_eq!(annotation.color, Some(Color::YELLOW));
    }

    #[test]
    fn comment_draft_carries_no_color() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );

        assert_eq!(state.live_draft().expect("draft expected").color, None);
    }

    #[test]
    fn comment_awaits_text_then_finalizes_on_submit() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );
        let up = apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 25.0 });

        assert_eq!(up, None);
        let pending = state.awaiting_comment_text().expect("comment should await text");
        assert_eq!(state.tool, Some(AnnotationKind::Comment));

        let finalized = apply_annotator_action(
            &mut state,
            AnnotatorAction::SubmitCommentText { text: "review this".to_owned() },
        );

        assert_eq!(finalized, Some(pending));
        assert_eq!(state.annotations[0].text.as_deref(), Some("review this"));
        assert_eq!(state.tool, None);
        assert_eq!(state.awaiting_comment_text(), None);
    }

    #[test]
    fn cancelled_comment_gets_empty_text() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 25.0 });

        let finalized = apply_annotator_action(&mut state, AnnotatorAction::CancelCommentText);

        assert!(finalized.is_some());
        assert_eq!(state.annotations[0].text.as_deref(), Some(""));
    }

    #[test]
    fn pointer_events_are_ignored_while_comment_awaits_text() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 25.0 });

        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 60.0, y: 60.0 },
        );

        assert_eq!(state.annotations.len(), 1);
        assert!(state.awaiting_comment_text().is_some());
    }

    #[test]
    fn signature_placements_keep_tool_active() {
        let mut state = session_with_tool(AnnotationKind::Signature);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 20.0 },
        );
        let up = apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 90.0 });
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 2, x: 30.0, y: 40.0 },
        );

        assert_eq!(up, None);
        assert_eq!(state.tool, Some(AnnotationKind::Signature));
        assert_eq!(state.annotations.len(), 2);
        assert_eq!(state.annotations[0].signature_data.as_deref(), Some(""));
        assert_eq!(state.annotations[0].width, None);
    }

    #[test]
    fn attach_signature_data_fills_placeholder() {
        let mut state = session_with_tool(AnnotationKind::Signature);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 20.0 },
        );
        let id = state.annotations[0].id;

        assert_eq!(state.annotations[0].signature_image(), None);

        apply_annotator_action(
            &mut state,
            AnnotatorAction::AttachSignatureData { id, data: "data:image/png;base64,AAAA".to_owned() },
        );

        assert_eq!(
            state.annotations[0].signature_image(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn second_pointer_down_abandons_live_draft() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 10.0 },
        );
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 70.0, y: 70.0 },
        );

        assert_eq!(state.annotations.len(), 1);
        assert_eq!(state.annotations[0].x, 70.0);
    }

    #[test]
    fn tool_switch_removes_unfinalized_draft() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 10.0 },
        );
        apply_annotator_action(
            &mut state,
            AnnotatorAction::SelectTool { tool: Some(AnnotationKind::Underline) },
        );

        assert!(state.annotations.is_empty());
        assert_eq!(state.tool, Some(AnnotationKind::Underline));
    }

    #[test]
    fn tool_switch_resolves_pending_comment_with_empty_text() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 25.0 });
        let pending = state.awaiting_comment_text().expect("comment should await text");

        let finalized = apply_annotator_action(
            &mut state,
            AnnotatorAction::SelectTool { tool: Some(AnnotationKind::Highlight) },
        );

        assert_eq!(finalized, Some(pending));
        assert_eq!(state.annotations[0].text.as_deref(), Some(""));
        assert_eq!(state.tool, Some(AnnotationKind::Highlight));
        assert_eq!(state.awaiting_comment_text(), None);
    }

    #[test]
    fn comment_text_actions_without_pending_are_ignored() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        let submitted = apply_annotator_action(
            &mut state,
            AnnotatorAction::SubmitCommentText { text: "stray".to_owned() },
        );
        let cancelled = apply_annotator_action(&mut state, AnnotatorAction::CancelCommentText);

        assert_eq!(submitted, None);
        assert_eq!(cancelled, None);
        assert_eq!(state.tool, Some(AnnotationKind::Highlight));
    }

    #[test]
    fn pointer_up_without_draft_is_ignored() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        let finalized = apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 50.0 });

        assert_eq!(finalized, None);
        assert!(state.annotations.is_empty());
    }

    #[test]
    fn remove_annotation_clears_session_markers() {
        let mut state = session_with_tool(AnnotationKind::Comment);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 5.0, y: 5.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::PointerUp { x: 25.0 });
        let id = state.awaiting_comment_text().expect("comment should await text");

        apply_annotator_action(&mut state, AnnotatorAction::RemoveAnnotation { id });

        assert!(state.annotations.is_empty());
        assert_eq!(state.awaiting_comment_text(), None);
    }

    #[test]
    fn load_document_resets_collection_but_keeps_color() {
        let mut state = session_with_tool(AnnotationKind::Highlight);
        apply_annotator_action(
            &mut state,
            AnnotatorAction::SetActiveColor { color: Color::rgb(0, 128, 255) },
        );
        apply_annotator_action(
            &mut state,
            AnnotatorAction::PointerDown { page: 1, x: 10.0, y: 10.0 },
        );
        apply_annotator_action(&mut state, AnnotatorAction::LoadDocument);

        assert!(state.annotations.is_empty());
        assert_eq!(state.tool, None);
        assert_eq!(state.active_color, Color::rgb(0, 128, 255));
    }

    #[test]
    fn hex_colors_round_trip_and_reject_garbage() {
        assert_eq!(Color::parse_hex("#ffff00"), Ok(Color::YELLOW));
        assert_eq!(Color::parse_hex("00ff00"), Ok(Color::rgb(0, 255, 0)));
        assert_eq!(Color::YELLOW.to_hex(), "#ffff00");

        assert!(Color::parse_hex("#fff").is_err());
        assert!(Color::parse_hex("#zzzzzz").is_err());
        assert!(Color::parse_hex("#ffff0ä").is_err());
    }

    #[test]
    fn annotation_json_uses_viewer_field_names() {
        let mut annotation =
            Annotation::draft(AnnotationKind::Highlight, 1, 10.0, 20.0, Some(Color::YELLOW));
        annotation.width = Some(100.0);
        annotation.height = Some(20.0);

        let json = serde_json::to_value(&annotation).expect("serialization should succeed");
        assert_eq!(json["type"], "highlight");
        assert_eq!(json["color"], "#ffff00");
        assert_eq!(json["page"], 1);
        assert!(json.get("signatureData").is_none());
    }

    #[test]
    fn annotation_json_without_id_gets_one_minted() {
        let raw = r#"{"type":"signature","page":2,"x":1.5,"y":3.0,"signatureData":""}"#;
        let annotation: Annotation = serde_json::from_str(raw).expect("parse should succeed");

        assert_eq!(annotation.kind, AnnotationKind::Signature);
        assert_eq!(annotation.signature_data.as_deref(), Some(""));
        assert!(!annotation.id.is_nil());
    }
}
