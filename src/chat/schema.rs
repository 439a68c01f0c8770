use serde_json::{json, Map, Value};

use super::inputs::ChatInputs;
use crate::llm_client::ToolSchema;
use crate::tools::safe_function_name;

/// Function-calling schema that exposes the whole crew as one callable tool.
pub fn generate_crew_tool_schema(inputs: &ChatInputs) -> Value {
    let properties: Map<String, Value> = inputs
        .inputs
        .iter()
        .map(|field| {
            (
                field.name.clone(),
                json!({
                    "type": "string",
                    "description": field
                        .description
                        .as_deref()
                        .unwrap_or("No description provided"),
                }),
            )
        })
        .collect();
    let required: Vec<&str> = inputs.inputs.iter().map(|f| f.name.as_str()).collect();

    json!({
        "type": "function",
        "function": {
            "name": safe_function_name(&inputs.crew_name),
            "description": inputs
                .crew_description
                .as_deref()
                .unwrap_or("No crew description"),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

/// The provider-neutral view of [`generate_crew_tool_schema`].
pub fn crew_tool(inputs: &ChatInputs) -> ToolSchema {
    let schema = generate_crew_tool_schema(inputs);
    let function = &schema["function"];
    ToolSchema {
        name: function["name"].as_str().unwrap_or_default().to_string(),
        description: function["description"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        parameters: function["parameters"].clone(),
    }
}
