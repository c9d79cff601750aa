// Analysis sections, their prompts and sample output

/// One part of the transcript analysis; each becomes one result key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    Mindmap,
    KeyPoints,
    Insights,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Summary,
        Section::Mindmap,
        Section::KeyPoints,
        Section::Insights,
    ];

    /// Result key the section is stored under
    pub fn key(self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Mindmap => "mindmap",
            Section::KeyPoints => "key_points",
            Section::Insights => "insights",
        }
    }

    pub fn prompt(self, transcript: &str) -> String {
        let instructions = match self {
            Section::Summary => {
                "Write a concise reading summary (300-500 words) of the video transcript below.\n\
                 1. Cover the main topic and the core arguments\n\
                 2. Use clear paragraphs\n\
                 3. Highlight key information and conclusions"
            }
            Section::Mindmap => {
                "Build a structured mind map of the video transcript below as a Markdown list.\n\
                 1. First level: the topic\n\
                 2. Second level: key points\n\
                 3. Third level: concrete details\n\
                 4. Keep every entry to a short phrase"
            }
            Section::KeyPoints => {
                "Extract and analyse the key points of the video transcript below.\n\
                 1. List 5-8 key points\n\
                 2. Give each a short explanation\n\
                 3. Rate importance as high, medium or low\n\
                 4. Format as Markdown"
            }
            Section::Insights => {
                "Give a reflective commentary on the video transcript below.\n\
                 1. Assess the value of the content from different angles\n\
                 2. Suggest follow-up ideas or applications\n\
                 3. Point out limitations\n\
                 4. Summarise the main takeaways\n\
                 5. Format as Markdown"
            }
        };
        format!("{instructions}\n\nTranscript:\n{transcript}")
    }

    /// Placeholder content used when no API key is configured
    pub fn sample(self, topic: &str) -> String {
        match self {
            Section::Summary => format!(
                "# Video Summary\n\n\
                 This video explores the core ideas and practical uses of {topic}.\n\n\
                 ## Main Content\n\n\
                 It opens with the basic concepts and then walks through the technical details, \
                 using worked examples to make the abstractions concrete.\n\n\
                 ## Core Points\n\n\
                 1. **Foundations**: the theoretical framework behind {topic}\n\
                 2. **Practice**: several real-world applications\n\
                 3. **Outlook**: where the field is heading"
            ),
            Section::Mindmap => format!(
                "# Mind Map\n\n\
                 ## Topic: {topic}\n\n\
                 ### Basics\n\
                 - Definitions and background\n\
                 - Related techniques\n\n\
                 ### Key Points\n\
                 - Main characteristics\n\
                 - How it is implemented\n\n\
                 ### Practice\n\
                 - Case studies\n\
                 - Rollout steps\n\n\
                 ### Outlook\n\
                 - Trends\n\
                 - Challenges and opportunities"
            ),
            Section::KeyPoints => format!(
                "# Key Points\n\n\
                 ## High importance\n\n\
                 ### 1. Core concepts\n\
                 {topic} is the central theme; understanding it is the basis for the rest.\n\n\
                 ### 2. Applications\n\
                 The examples shown transfer directly to everyday work.\n\n\
                 ## Medium importance\n\n\
                 ### 3. Implementation details\n\
                 Tooling choices and configuration are covered step by step.\n\n\
                 ## Low importance\n\n\
                 ### 4. Further reading\n\
                 Additional resources are mentioned at the end."
            ),
            Section::Insights => format!(
                "# Insights\n\n\
                 ## Value\n\n\
                 The video presents {topic} from both the theoretical and the practical side.\n\n\
                 ## Applications\n\n\
                 1. **Teaching**: usable as course material\n\
                 2. **Projects**: offers a workable implementation plan\n\n\
                 ## Critique\n\n\
                 - Some technical details could go deeper\n\
                 - A comparison with alternatives is missing\n\n\
                 ## Takeaways\n\n\
                 Pair the video with hands-on practice to consolidate {topic}."
            ),
        }
    }
}

const TOPICS: [&str; 6] = [
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural networks",
    "data science",
    "technology",
];

/// Topic keyword for sample content, looked up in the start of the transcript
pub fn detect_topic(transcript: &str) -> &'static str {
    let head: String = transcript.chars().take(500).collect::<String>().to_lowercase();
    TOPICS
        .iter()
        .find(|topic| head.contains(*topic))
        .copied()
        .unwrap_or("the subject")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_keys() {
        let keys: Vec<&str> = Section::ALL.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["summary", "mindmap", "key_points", "insights"]);
    }

    #[test]
    fn test_prompt_embeds_transcript() {
        let prompt = Section::Mindmap.prompt("the transcript text");
        assert!(prompt.contains("mind map"));
        assert!(prompt.ends_with("the transcript text"));
    }

    #[test]
    fn test_detect_topic() {
        assert_eq!(
            detect_topic("Today: Machine Learning for beginners"),
            "machine learning"
        );
        assert_eq!(detect_topic("cooking pasta"), "the subject");
    }
}
