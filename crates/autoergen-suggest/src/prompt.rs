use crate::engine::GenerationRequest;

const MARKUP_SYSTEM: &str = "You are a senior database architect. \
Convert the user's description into a VALID Graphviz DOT string for an ER diagram. \
Use box shapes for entities. \
No markdown. No explanations. \
Return ONLY raw DOT code.";

const STRUCTURED_SYSTEM: &str =
    "You are an expert database architect. Always return output in valid JSON format.";

/// Request for the markup pipeline: the model writes DOT directly and the
/// description is sent verbatim.
pub fn markup_request(description: &str, temperature: f32) -> GenerationRequest {
    GenerationRequest {
        system: MARKUP_SYSTEM.to_string(),
        user: description.to_string(),
        temperature,
    }
}

/// Request for the structured pipeline: the model returns the ER
/// specification as JSON.
pub fn structured_request(description: &str, temperature: f32) -> GenerationRequest {
    GenerationRequest {
        system: STRUCTURED_SYSTEM.to_string(),
        user: structured_user_message(description),
        temperature,
    }
}

fn structured_user_message(description: &str) -> String {
    format!(
        "Extract entities and relationships from the following database description:\n\
\"{description}\"\n\n\
Return as JSON with this exact structure:\n\
{{\n    \"entities\": [\"Entity1\", \"Entity2\"],\n    \"relationships\": [\n        \
{{\"from\": \"Entity1\", \"to\": \"Entity2\", \"relation\": \"description\"}}\n    ]\n}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_request_passes_text_verbatim() {
        let req = markup_request("  Customers place Orders\n", 0.2);
        assert_eq!(req.user, "  Customers place Orders\n");
        assert!(req.system.contains("Graphviz DOT"));
        assert_eq!(req.temperature, 0.2);
    }

    #[test]
    fn test_structured_request_embeds_description_and_shape() {
        let req = structured_request("Customers place Orders", 0.0);
        assert!(req.user.contains("\"Customers place Orders\""));
        assert!(req.user.contains("\"entities\": [\"Entity1\", \"Entity2\"]"));
        assert!(req
            .user
            .contains("{\"from\": \"Entity1\", \"to\": \"Entity2\", \"relation\": \"description\"}"));
        assert!(req.system.contains("valid JSON"));
    }

    #[test]
    fn test_embedded_quotes_are_not_escaped() {
        let req = structured_request("a \"quoted\" table", 0.0);
        assert!(req.user.contains("\"a \"quoted\" table\""));
    }
}
