use crate::models::{ChatMessage, Problem, Proficiency};

/// How many previous messages are replayed to the model.
pub const HISTORY_WINDOW: usize = 5;

// ── Proficiency table ────────────────────────────────────────────────────────

impl Proficiency {
    pub const ALL: [Proficiency; 3] = [
        Proficiency::Beginner,
        Proficiency::Intermediate,
        Proficiency::Advanced,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Proficiency::Beginner => "Beginner (New to DSA)",
            Proficiency::Intermediate => "Intermediate (Familiar with basic concepts)",
            Proficiency::Advanced => "Advanced (Comfortable with most DSA topics)",
        }
    }

    /// Level name without the parenthesised description.
    pub fn short_name(&self) -> &'static str {
        match self {
            Proficiency::Beginner => "Beginner",
            Proficiency::Intermediate => "Intermediate",
            Proficiency::Advanced => "Advanced",
        }
    }

    pub fn guidelines(&self) -> &'static str {
        match self {
            Proficiency::Beginner => {
                "- Use simple, everyday analogies\n\
                 - Explain basic concepts thoroughly\n\
                 - Break problems down into very small steps\n\
                 - Define technical terms when they come up\n\
                 - Prefer visual explanations when possible\n\
                 - Start from the most basic approach\n\
                 - Make sure the problem itself is understood first\n\
                 - Suggest similar, easier problems for practice"
            }
            Proficiency::Intermediate => {
                "- Build upon known DSA concepts\n\
                 - Focus on optimization techniques\n\
                 - Discuss multiple approaches\n\
                 - Encourage pattern recognition\n\
                 - Include time/space complexity analysis\n\
                 - Challenge thinking with guiding questions\n\
                 - Reference similar problems they might know\n\
                 - Discuss trade-offs between approaches"
            }
            Proficiency::Advanced => {
                "- Focus on optimal solutions\n\
                 - Discuss advanced optimization techniques\n\
                 - Explore edge cases in detail\n\
                 - Challenge with follow-up questions\n\
                 - Discuss algorithmic patterns\n\
                 - Explore multiple optimal approaches\n\
                 - Consider real-world applications\n\
                 - Discuss solution scalability"
            }
        }
    }

    /// Resolve free text (`"advanced"` or a full label) to a level, falling
    /// back to the default for anything unrecognised.
    pub fn resolve(input: Option<&str>) -> Proficiency {
        let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
            return Proficiency::default();
        };
        Self::ALL
            .into_iter()
            .find(|p| {
                raw.eq_ignore_ascii_case(p.short_name()) || raw.eq_ignore_ascii_case(p.label())
            })
            .unwrap_or_default()
    }
}

// ── Prompt text ──────────────────────────────────────────────────────────────

pub fn system_prompt(problem_url: &str, proficiency: Proficiency) -> String {
    format!(
        "You are a helpful DSA Teaching Assistant. Your goal is to help students understand \
and solve the LeetCode problem at {url}.

Student's proficiency level: {level}

Follow these guidelines:

1. Never provide direct solutions
2. Guide students with:
    - Clarifying questions
    - Conceptual explanations
    - Similar simpler examples
    - Hints about approach
3. If students seem stuck:
    - Break down the problem
    - Suggest drawing/visualizing
    - Point to related concepts
4. Encourage problem-solving skills:
    - Ask about edge cases
    - Suggest test cases
    - Discuss time/space complexity

Remember: your goal is to help students learn, not to solve for them.",
        url = problem_url,
        level = proficiency.label(),
    )
}

/// Problem facts handed to the model alongside the conversation.
pub fn problem_context(problem: &Problem) -> String {
    let topics = problem.topic_tags.join(", ");

    let examples = problem
        .examples
        .iter()
        .enumerate()
        .map(|(i, e)| format!("Example {}: {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n");

    let similar = if problem.similar_questions.is_empty() {
        "None".to_string()
    } else {
        problem
            .similar_questions
            .iter()
            .map(|q| format!("{} ({})", q.title, q.difficulty))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Problem: {title} (LC{id})\n\
         Difficulty: {difficulty}\n\
         Topics: {topics}\n\
         \n\
         Problem Description:\n\
         {description}\n\
         \n\
         Examples:\n\
         {examples}\n\
         \n\
         Similar Questions: {similar}",
        title = problem.title,
        id = problem.question_id,
        difficulty = problem.difficulty,
        topics = topics,
        description = problem.description.text,
        examples = examples,
        similar = similar,
    )
}

pub fn build_prompt(
    problem: &Problem,
    proficiency: Proficiency,
    history: &[ChatMessage],
    question: &str,
) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let context = history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{system}

{problem}

Student Proficiency Level: {label}

Previous conversation:
{context}

User question: {question}

Guidelines for this proficiency level:
{guidelines}

Additional Instructions:
1. Don't provide direct solutions
2. Guide with hints and questions appropriate for {level} level
3. Focus on building problem-solving intuition
4. Use examples to illustrate concepts
5. Use code blocks for any code snippets (wrapped in ```)
6. Use mathematical notation when needed (wrapped in $ or $$)

Your response:",
        system = system_prompt(&problem.url, proficiency),
        problem = problem_context(problem),
        label = proficiency.label(),
        context = context,
        question = question,
        guidelines = proficiency.guidelines(),
        level = proficiency.short_name(),
    )
}

pub fn greeting(problem: &Problem) -> String {
    format!(
        "Hi! I'm your DSA Teaching Assistant. I'll help you with: {}",
        problem.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedDescription, SimilarQuestion};

    fn sample_problem() -> Problem {
        Problem {
            question_id: "1".into(),
            url: "https://leetcode.com/problems/two-sum/".into(),
            title_slug: "two-sum".into(),
            title: "Two Sum".into(),
            difficulty: "Easy".into(),
            topic_tags: vec!["Array".into(), "Hash Table".into()],
            description: NormalizedDescription {
                text: "Find two numbers.".into(),
                images: Vec::new(),
            },
            examples: vec!["[2,7,11,15]".into(), "9".into()],
            similar_questions: Vec::new(),
            raw_html: String::new(),
        }
    }

    #[test]
    fn resolve_matches_names_and_labels() {
        assert_eq!(Proficiency::resolve(Some("beginner")), Proficiency::Beginner);
        assert_eq!(Proficiency::resolve(Some(" ADVANCED ")), Proficiency::Advanced);
        assert_eq!(
            Proficiency::resolve(Some("Beginner (New to DSA)")),
            Proficiency::Beginner
        );
    }

    #[test]
    fn resolve_falls_back_to_intermediate() {
        assert_eq!(Proficiency::resolve(None), Proficiency::Intermediate);
        assert_eq!(Proficiency::resolve(Some("")), Proficiency::Intermediate);
        assert_eq!(Proficiency::resolve(Some("grandmaster")), Proficiency::Intermediate);
    }

    #[test]
    fn every_level_has_guidelines() {
        for level in Proficiency::ALL {
            assert!(level.guidelines().starts_with("- "));
            assert!(level.label().starts_with(level.short_name()));
        }
    }

    #[test]
    fn context_lists_examples_and_similar_questions() {
        let mut problem = sample_problem();
        let ctx = problem_context(&problem);
        assert!(ctx.contains("Problem: Two Sum (LC1)"));
        assert!(ctx.contains("Topics: Array, Hash Table"));
        assert!(ctx.contains("Example 1: [2,7,11,15]\nExample 2: 9"));
        assert!(ctx.contains("Similar Questions: None"));

        problem.similar_questions.push(SimilarQuestion {
            title: "3Sum".into(),
            difficulty: "Medium".into(),
            title_slug: "3sum".into(),
        });
        assert!(problem_context(&problem).contains("Similar Questions: 3Sum (Medium)"));
    }

    #[test]
    fn prompt_replays_only_recent_history() {
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| ChatMessage::user(format!("message {}", i)))
            .collect();
        let prompt = build_prompt(&sample_problem(), Proficiency::Advanced, &history, "next?");

        assert!(!prompt.contains("message 2"));
        for i in 3..8 {
            assert!(prompt.contains(&format!("user: message {}", i)));
        }
        assert!(prompt.contains("User question: next?"));
        assert!(prompt.contains("appropriate for Advanced level"));
        assert!(prompt.contains(Proficiency::Advanced.guidelines()));
        assert!(prompt.contains("https://leetcode.com/problems/two-sum/"));
    }

    #[test]
    fn prompt_with_short_history_keeps_everything() {
        let history = vec![
            ChatMessage::assistant("Hi!"),
            ChatMessage::user("How do I start?"),
        ];
        let prompt = build_prompt(&sample_problem(), Proficiency::Beginner, &history, "hint?");
        assert!(prompt.contains("assistant: Hi!\nuser: How do I start?"));
    }
}
