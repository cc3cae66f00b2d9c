use super::Language;

const ZH_BODY_RULES: &str =
    "请提供信息丰富且中立的内容。不要使用markdown、标题或任何特殊格式。只返回定义本身的文本。";

const EN_BODY_RULES: &str = "Please provide informative and neutral content. \
     Do not use markdown, headings, or any special formatting. \
     Return only the text of the definition itself.";

/// Builds the prompt sent to a text-generation backend.
///
/// A free-form `context` turns the topic into a question and wins over
/// `category`; a `category` scopes the definition; otherwise the bare term is
/// defined. Blank `category`/`context` values count as absent.
pub fn build_prompt(
    topic: &str,
    language: Language,
    category: Option<&str>,
    context: Option<&str>,
) -> String {
    let category = category.filter(|c| !c.trim().is_empty());
    let context = context.filter(|c| !c.trim().is_empty());

    match (language, context, category) {
        (Language::Zh, Some(context), _) => {
            format!("请用中文回答\"{topic}\"。\n\n上下文信息：{context}")
        }
        (Language::Zh, None, Some(category)) => format!(
            "请用中文为{category}类别里的术语\"{topic}\"提供一个简洁、百科全书式的定义。{ZH_BODY_RULES}"
        ),
        (Language::Zh, None, None) => {
            format!("请用中文为术语\"{topic}\"提供一个简洁、百科全书式的定义。{ZH_BODY_RULES}")
        }
        (Language::En, Some(context), _) => format!(
            "Please answer the question \"{topic}\" in English.\n\nContext information: {context}"
        ),
        (Language::En, None, Some(category)) => format!(
            "Please provide a concise, encyclopedia-style definition for the term: \"{topic}\" \
             in the category of {category} in English. {EN_BODY_RULES}"
        ),
        (Language::En, None, None) => format!(
            "Please provide a concise, encyclopedia-style definition for the term: \"{topic}\" \
             in English. {EN_BODY_RULES}"
        ),
    }
}
