pub const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that answers questions based on a knowledge graph.
You will be given relevant facts extracted from the knowledge graph.
Use these facts to provide accurate, comprehensive answers.

Guidelines:
- Only use information from the provided context
- If the context doesn't contain enough information, say so
- Be concise but thorough
- Cite specific facts when relevant
- If you're uncertain, express that uncertainty"#;

pub fn build_user_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Context from Knowledge Graph:
{}

Question: {}

Please provide a comprehensive answer based on the above context."#,
        context, question
    )
}
