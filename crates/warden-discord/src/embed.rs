//! Builds the embed `discord_embed` actually sends. Fields arrive
//! pre-structured from the tool call (`warden_agent::tools::fork_tools`)
//! rather than parsed out of free-form model text.

use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use warden_agent::fire_context::EmbedContent;

const DEFAULT_COLOR: u32 = 0x5865f2; // Discord blurple.

fn resolve_color(name: Option<&str>) -> u32 {
    match name.map(str::to_lowercase).as_deref() {
        Some("blue") => 0x3498db,
        Some("green") => 0x2ecc71,
        Some("red") => 0xe74c3c,
        Some("yellow") => 0xf1c40f,
        _ => DEFAULT_COLOR,
    }
}

pub fn build_embed(content: &EmbedContent<'_>) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(content.title)
        .colour(resolve_color(content.color));
    if let Some(description) = content.description {
        embed = embed.description(description);
    }
    for field in content.fields {
        embed = embed.field(&field.name, &field.value, field.inline);
    }
    embed.footer(CreateEmbedFooter::new(content.footer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_embed_does_not_panic_on_empty_fields() {
        let _ = build_embed(&EmbedContent {
            title: "status",
            description: None,
            color: None,
            fields: &[],
            footer: "bg",
        });
    }
}
