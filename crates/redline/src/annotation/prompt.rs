//! Prompt construction for the annotation worker.

use super::worker::WorkerInput;

/// Builds the single generation prompt: the full document text, the
/// annotation-eligible feedback (weaknesses and recommendations), and the
/// strengths as background only. Strengths must never become annotation
/// items; the prompt says so explicitly because the model will otherwise
/// happily annotate praise.
pub fn build_annotation_prompt(input: &WorkerInput) -> String {
    let weaknesses = format_feedback_list(&input.weaknesses);
    let recommendations = format_feedback_list(&input.recommendations);
    let strengths = if input.strengths.is_empty() {
        "(none)".to_string()
    } else {
        input
            .strengths
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You annotate evaluated documents by interleaving reviewer feedback with the original text.
Respond ONLY with valid JSON, no markdown fencing, matching exactly:
{{"sections": [
  {{"type": "text", "content": "<verbatim run of original text>"}},
  {{"type": "annotations", "items": [
    {{"priority": "high|medium|low", "type": "weakness|recommendation", "text": "<annotation>"}}
  ]}}
]}}

RULES:
- Reproduce the ENTIRE original document across the "text" sections, in order, splitting only where annotations belong.
- Create annotation items ONLY from the weaknesses and recommendations below.
- The strengths are context to help you place annotations; never turn them into items.
- Every "text" content and every item "text" must be non-empty.

ORIGINAL DOCUMENT:
{document}

WEAKNESSES:
{weaknesses}

RECOMMENDATIONS:
{recommendations}

STRENGTHS (context only):
{strengths}
"#,
        document = input.document_text,
        weaknesses = weaknesses,
        recommendations = recommendations,
        strengths = strengths,
    )
}

fn format_feedback_list(items: &[super::worker::FeedbackItem]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| match &item.priority {
            Some(priority) => format!("- [{}] {}", priority, item.body),
            None => format!("- {}", item.body),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
