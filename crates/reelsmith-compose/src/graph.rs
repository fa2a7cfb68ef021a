//! Filter graph for the final composite.

use std::path::Path;

/// Fill colour for the letterbox around the scaled base video.
pub const PAD_COLOR: &str = "black";

/// Fixed burned-in subtitle style, expressed as ASS `force_style` fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    /// ASS colour, `&HAABBGGRR`.
    pub primary_colour: String,
    pub back_colour: String,
    pub outline: u32,
    /// 1 = outline + shadow, 3 = opaque box behind the text.
    pub border_style: u32,
    /// Numpad-style alignment; 2 is bottom centre.
    pub alignment: u32,
    pub margin_v: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Poppins-Bold".to_string(),
            font_size: 24,
            primary_colour: "&H00FFFFFF".to_string(),
            back_colour: "&H80000000".to_string(),
            outline: 2,
            border_style: 3,
            alignment: 2,
            margin_v: 200,
        }
    }
}

impl SubtitleStyle {
    pub fn force_style(&self) -> String {
        format!(
            "FontName={},FontSize={},PrimaryColour={},BackColour={},BorderStyle={},Outline={},Shadow=0,Alignment={},MarginV={}",
            self.font_name,
            self.font_size,
            self.primary_colour,
            self.back_colour,
            self.border_style,
            self.outline,
            self.alignment,
            self.margin_v
        )
    }
}

/// Build the `-filter_complex` graph.
///
/// Inputs: `0:v` base video, `1:v` overlay frame sequence. The result is
/// labelled `[outv]`.
pub fn build_filter_graph(
    width: u32,
    height: u32,
    subtitles: Option<&Path>,
    style: &SubtitleStyle,
) -> String {
    let mut graph = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:{PAD_COLOR}[base];\
         [1:v]format=rgba,scale={w}:{h}[overlay];",
        w = width,
        h = height
    );

    match subtitles {
        Some(srt) => {
            graph.push_str("[base][overlay]overlay=0:0:format=auto[composited];");
            graph.push_str(&format!(
                "[composited]subtitles=filename={}:force_style='{}'[outv]",
                escape_filter_path(srt),
                style.force_style()
            ));
        }
        None => graph.push_str("[base][overlay]overlay=0:0:format=auto[outv]"),
    }

    graph
}

/// Escape a path for use as a filter option value inside a filter graph.
///
/// Two levels apply: the option parser (`\ ' :`) and then the graph parser
/// (`\ ' [ ] , ;`).
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");

    let mut level1 = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            level1.push('\\');
        }
        level1.push(c);
    }

    let mut level2 = String::with_capacity(level1.len());
    for c in level1.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            level2.push('\\');
        }
        level2.push(c);
    }
    level2
}
