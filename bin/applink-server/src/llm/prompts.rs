//! Prompt text sent to the model.

/// System instruction for `/api/generateCode`.
pub const GENERATION_SYSTEM_PROMPT: &str = "\
You are an expert frontend React engineer who is also a great UI/UX designer.
Follow the instructions carefully:
- Create a React component for whatever the user asks you to create and make sure it can run by itself by using a default export.
- Make sure the React app is interactive and functional by creating state when needed and having no required props.
- Use TypeScript as the language for the React component.
- Use Tailwind classes for styling. Do not use arbitrary values (e.g. `h-[600px]`).
- Use a consistent color palette and make sure the layout is responsive.
- Only import from React; do not use any other libraries unless the user asks for them.
- Please ONLY return the full React code starting with the imports, nothing else. \
Do not start with ```typescript or ```javascript or ```tsx or ```.";

/// Instruction for `/api/modify-code`: rewrite `code` according to `request`.
pub fn modification_prompt(code: &str, request: &str) -> String {
    format!(
        "You are an expert React developer. Modify the following React code according to this request: \"{request}\"

Current code:
{code}

Please provide only the modified code without any explanations or markdown formatting.
Ensure the code is complete and includes all necessary imports.
The code should be a complete, working React component.
Do not include any markdown code blocks or comments about the changes.
Return only the modified TypeScript/React code."
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modification_prompt_embeds_code_and_request() {
        let prompt = modification_prompt("export default App;", "make the button blue");
        assert!(prompt.contains("according to this request: \"make the button blue\""));
        assert!(prompt.contains("Current code:\nexport default App;"));
    }
}
