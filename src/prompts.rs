use serde::Deserialize;

/// Structured style directives, the JSON alternative to free-form
/// `--style-instructions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreationNeeds {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub layout_sketch: Option<String>,
}

impl CreationNeeds {
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
            && self.style.is_none()
            && self.labels.is_empty()
            && self.layout_sketch.is_none()
    }
}

/// How the caller expressed styling for the generated image.
#[derive(Debug, Clone)]
pub enum StyleSpec {
    None,
    Freeform(String),
    Structured(CreationNeeds),
}

pub fn scoring_instructions(subject: &str) -> String {
    format!(
        r#"Analyze each image for how well it represents: {subject}

For EACH image, provide:
- confidence_score: 0-10 (how well it matches the subject)
- matched_details: what specific elements in the image match the subject

Respond with ONLY a JSON array:
[
  {{"index": 0, "confidence_score": 9, "matched_details": "Shows exploded view with labeled bracket, runner, and locking device"}},
  {{"index": 1, "confidence_score": 3, "matched_details": "Only shows packaging, not the actual product"}}
]
"#
    )
}

pub fn scoring_image_label(position: usize, description: Option<&str>) -> String {
    format!(
        "\n--- Image {position} ---\nDescription: {}\n",
        description.unwrap_or("None")
    )
}

pub fn scoring_epilogue() -> &'static str {
    "\nRespond with ONLY the JSON array, no other text:"
}

pub fn generation_header(subject: &str) -> String {
    format!("TASK: Generate an image of `{subject}`.\n\nHere are the reference images:")
}

pub fn reference_label(position: usize) -> String {
    format!("\n**Reference Image {position}:**")
}

/// Closing instruction block for the generation request. References may be
/// wrong or redundant, so the model is told to reconcile them against the
/// subject, keep one instance of repeated components, and stay text-free
/// unless labels were explicitly requested.
pub fn generation_instructions(style: &StyleSpec) -> String {
    let style_block = render_style(style);
    let text_rule = match style {
        StyleSpec::Structured(needs) if !needs.labels.is_empty() => {
            "Render only the requested label text; do not add any other text to the image."
        }
        _ => "Do not include the subject title text in the image unless explicitly requested.",
    };

    format!(
        r#"
INSTRUCTIONS:
1. First, analyze the reference image(s) above to identify the key product components, structure, and visual style.
   Note: Reference images may contain errors or be irrelevant. If a reference image clearly conflicts with the subject description or appears unrelated, ignore that specific image or element.
2. Second, understand the specific product details that make this item unique—accurate components matter. If the references repeat the same product component, keep a single instance of it.
3. Third, plan the composition and layout that best presents this subject.
4. Finally, generate the image combining accurate product details with professional presentation.{style_block}

{text_rule}"#
    )
}

fn render_style(style: &StyleSpec) -> String {
    match style {
        StyleSpec::None => String::new(),
        StyleSpec::Freeform(text) => format!("\n\nApply styling: {text}"),
        StyleSpec::Structured(needs) if needs.is_empty() => String::new(),
        StyleSpec::Structured(needs) => {
            let mut lines = vec!["\n\nApply styling:".to_string()];
            if !needs.colors.is_empty() {
                lines.push(format!("- Color palette: {}", needs.colors.join(", ")));
            }
            if let Some(style_name) = &needs.style {
                lines.push(format!("- Style: {style_name}"));
            }
            if !needs.labels.is_empty() {
                let quoted: Vec<String> =
                    needs.labels.iter().map(|l| format!("\"{l}\"")).collect();
                lines.push(format!("- Render these labels exactly: {}", quoted.join(", ")));
            }
            if let Some(sketch) = &needs.layout_sketch {
                lines.push(format!("- Follow this layout sketch:\n{sketch}"));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_instructions_suppress_incidental_text() {
        let text = generation_instructions(&StyleSpec::None);
        assert!(text.contains("Do not include the subject title text"));
        assert!(!text.contains("Apply styling"));
    }

    #[test]
    fn freeform_style_is_applied_verbatim() {
        let style = StyleSpec::Freeform("Technical diagram, white background".into());
        let text = generation_instructions(&style);
        assert!(text.contains("Apply styling: Technical diagram, white background"));
        assert!(text.contains("Do not include the subject title text"));
    }

    #[test]
    fn structured_needs_render_each_directive() {
        let needs = CreationNeeds {
            colors: vec!["matte black".into(), "brushed steel".into()],
            style: Some("technical line art".into()),
            labels: vec!["A".into(), "B".into()],
            layout_sketch: Some("[product] | [callouts]".into()),
        };
        let text = generation_instructions(&StyleSpec::Structured(needs));
        assert!(text.contains("- Color palette: matte black, brushed steel"));
        assert!(text.contains("- Style: technical line art"));
        assert!(text.contains("- Render these labels exactly: \"A\", \"B\""));
        assert!(text.contains("- Follow this layout sketch:\n[product] | [callouts]"));
    }

    #[test]
    fn explicit_labels_lift_the_no_text_rule() {
        let needs = CreationNeeds {
            labels: vec!["TANDEM 560H".into()],
            ..Default::default()
        };
        let text = generation_instructions(&StyleSpec::Structured(needs));
        assert!(text.contains("Render only the requested label text"));
        assert!(!text.contains("Do not include the subject title text"));
    }

    #[test]
    fn empty_structured_needs_add_nothing() {
        let text = generation_instructions(&StyleSpec::Structured(CreationNeeds::default()));
        assert!(!text.contains("Apply styling"));
    }

    #[test]
    fn creation_needs_parse_from_partial_json() {
        let needs: CreationNeeds =
            serde_json::from_str(r#"{"colors": ["red"], "style": "flat lay"}"#).unwrap();
        assert_eq!(needs.colors, vec!["red"]);
        assert_eq!(needs.style.as_deref(), Some("flat lay"));
        assert!(needs.labels.is_empty());
        assert!(needs.layout_sketch.is_none());
    }

    #[test]
    fn scoring_prompt_names_the_subject_and_image_positions() {
        let prompt = scoring_instructions("Blum TANDEM drawer slide exploded view");
        assert!(prompt.contains("Blum TANDEM drawer slide exploded view"));
        assert!(prompt.contains("confidence_score"));

        let label = scoring_image_label(2, Some("catalog photo"));
        assert!(label.contains("--- Image 2 ---"));
        assert!(label.contains("catalog photo"));
        assert!(scoring_image_label(0, None).contains("Description: None"));
    }
}
