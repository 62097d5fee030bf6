use std::collections::HashSet;

/// Template used for providers that follow an explicit JSON schema
/// instruction block.
const STRUCTURED_TEMPLATE: &str = r#"# Role: 一个表情包专家，擅长根据用户描述为用户选取最合适表情包

## Language: 中文

## Workflow
1. 学习 ##EmojiList 中给出表情包列表中每一个表情包的含义。其filename属性记录了表情包文件名`filename`，内容则是表情包的含义表示。
2. 根据 ##UserInput,选取一个最符合的表情包并返回, 一定不要自己构造数据,按照指定的JSON格式结构输出结果, 包含以下2个关键输出字段: `filename`、`content`。

## EmojiList
<div>
    {context}
</div>

## UserInput
<div>
    {prompt}
</div>

## Output format
<div>
The output should be formatted as a JSON instance that conforms to the JSON schema below.
filename: str
content: str
As an example, for the schema
{
   "filename":"",
   "content":"",
}

输出示例：
```json
{
    "filename": "5a122755-9316-4d05-81f4-26da5396c04e.jpg",
    "content": "这个表情包中的内容和笑点在于它展示了许多带有悲伤或不满情绪的表情符号，这些表情符号的脸部表情看起来都非常忧郁或不高兴。图片下方的文字“我的世界一片灰色”可能意味着这个表情包的使用者感到沮丧或情绪低落，就像世界失去了颜色一样。这种夸张的表达方式和文字与表情符号的结合，使得这个表情包在传达负面情绪的同时，也带有一定的幽默感。"
}
```
</div>

## Start
作为一个 #Role, 你默认使用的是##Language，你不需要介绍自己，请根据##Workflow开始工作，你必须严格遵守输出格式##Output format,输出格式指定的JSON格式要求。
"#;

/// Simpler, more repetitive template for providers with weaker instruction
/// following.
const LEGACY_TEMPLATE: &str = r#"表情包列表:
{context}

用户描述：
{prompt}

请根据以下要求，根据用户描述为用户选取最合适表情包:

1. 学习`表情包列表`中每一个表情包的含义, 其中metadata属性记录了表情包文件名，内容则是表情包的含义表示

2. 根据`用户描述`,选取一个最符合的表情包,一定不要自己构造数据，请按照指定的JSON格式结构输出结果, 包含以下2个关键输出字段: `filename`、`content`,具体格式如下：
```json
{
  "filename": string,
  "content": string
}
```
输出示例：
```json
{
    "filename": "5a122755-9316-4d05-81f4-26da5396c04e.jpg",
    "content": "这个表情包中的内容和笑点在于它展示了许多带有悲伤或不满情绪的表情符号，这些表情符号的脸部表情看起来都非常忧郁或不高兴。图片下方的文字“我的世界一片灰色”可能意味着这个表情包的使用者感到沮丧或情绪低落，就像世界失去了颜色一样。这种夸张的表达方式和文字与表情符号的结合，使得这个表情包在传达负面情绪的同时，也带有一定的幽默感。"
}
```

请严格按照上述要求进行信息提取、格式输出,并遵守输出格式指定的JSON格式要求。
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Structured,
    Legacy,
}

/// Chooses the template once per invocation, keyed by provider capability.
/// The capability set comes from configuration so new providers are
/// classified without code changes.
#[derive(Debug, Clone)]
pub struct PromptSelector {
    structured_providers: HashSet<String>,
}

impl PromptSelector {
    pub fn new(structured_providers: &[String]) -> Self {
        Self {
            structured_providers: structured_providers
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
        }
    }

    pub fn style_for(&self, provider: &str) -> PromptStyle {
        if self.structured_providers.contains(&provider.to_lowercase()) {
            PromptStyle::Structured
        } else {
            PromptStyle::Legacy
        }
    }

    pub fn render(&self, provider: &str, context: &str, prompt: &str) -> String {
        let template = match self.style_for(provider) {
            PromptStyle::Structured => STRUCTURED_TEMPLATE,
            PromptStyle::Legacy => LEGACY_TEMPLATE,
        };
        template
            .replace("{context}", context)
            .replace("{prompt}", prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_selector() -> PromptSelector {
        PromptSelector::new(&["openai".to_string(), "deepseek".to_string()])
    }

    #[test]
    fn capability_set_drives_the_branch() {
        let selector = default_selector();
        assert_eq!(selector.style_for("openai"), PromptStyle::Structured);
        assert_eq!(selector.style_for("deepseek"), PromptStyle::Structured);
        assert_eq!(selector.style_for("zhipuai"), PromptStyle::Legacy);
        assert_eq!(selector.style_for("unheard-of"), PromptStyle::Legacy);

        let reclassified = PromptSelector::new(&["zhipuai".to_string()]);
        assert_eq!(reclassified.style_for("zhipuai"), PromptStyle::Structured);
        assert_eq!(reclassified.style_for("openai"), PromptStyle::Legacy);
    }

    #[test]
    fn render_substitutes_context_and_prompt() {
        let selector = default_selector();
        let rendered = selector.render("openai", "<emoji id='0'>joy</emoji>", "今天很开心");
        assert!(rendered.contains("<emoji id='0'>joy</emoji>"));
        assert!(rendered.contains("今天很开心"));
        assert!(rendered.contains("## EmojiList"));
        assert!(!rendered.contains("{context}"));
        assert!(!rendered.contains("{prompt}"));
    }

    #[test]
    fn legacy_render_uses_the_plain_template() {
        let selector = default_selector();
        let rendered = selector.render("zhipuai", "ctx", "prompt text");
        assert!(rendered.contains("表情包列表"));
        assert!(!rendered.contains("## EmojiList"));
    }
}
