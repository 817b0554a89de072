//! Prompt text sent to the generative models

use crate::types::{PostKind, PromptTemplate};

/// System instruction for the chat assistant
pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are a friendly assistant for a small business \
owner who manages a Facebook Page. Help with marketing ideas, caption wording, hashtags and \
posting strategy. Keep answers short and practical.";

/// Opening line shown when a chat session starts
pub const CHAT_GREETING: &str = "Hi! How can I help with your posts today?";

fn post_kind_instruction(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Image => "The user has provided a single image.",
        PostKind::Video => "The user has provided a single video.",
        PostKind::Carousel => {
            "The user has provided multiple images for a carousel post. Your caption should suit \
             a multi-image post, either by telling a story across the images or by describing \
             all of them together."
        }
    }
}

/// Caption request built from pasted sheet data and the post shape
pub fn caption_prompt(sheet_data: &str, kind: PostKind, custom: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a professional social media manager writing an engaging Facebook post.\n\
         \n\
         **Context from the product sheet:**\n\
         {sheet}\n\
         \n\
         **Post format:**\n\
         {format}\n\
         \n\
         **Instructions:**\n\
         1. Write a compelling, creative caption based on the context and the attached media.\n\
         2. Keep the tone friendly and professional, suited to the product or service.\n\
         3. Include a clear call to action.\n\
         4. Add 3-5 relevant, popular hashtags.\n\
         5. Use emojis where they make the post more engaging.\n",
        sheet = sheet_data.trim(),
        format = post_kind_instruction(kind),
    );

    if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n**Custom instructions from the user:**\n");
        prompt.push_str(custom);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nGenerate only the caption text. A product link is added separately, so do not \
         include any placeholder links or URLs.",
    );
    prompt
}

/// Wrap a short subject in the marketing photography brief
pub fn image_prompt(subject: &str) -> String {
    format!(
        "Professional, high-quality marketing photography for a social media post.\n\
         Subject: \"{}\".\n\
         Style: photorealistic, clean, bright lighting, high detail, studio quality.\n\
         Avoid: text, logos, watermarks, blurry backgrounds, unrealistic shadows.",
        subject.trim()
    )
}

/// Built-in caption styles used until the user saves their own list
pub fn default_templates() -> Vec<PromptTemplate> {
    [
        ("Playful", "Write a fun, casual caption with plenty of emojis to drive engagement."),
        ("Professional", "Write a formal, polite and trustworthy caption focused on clear information."),
        ("Humorous", "Write a caption that raises a smile with a light joke, without being too informal."),
        ("Educational", "Write a caption that teaches something useful about the product or service and positions the brand as an expert."),
        ("Flash sale", "Announce a discount with a sense of urgency and value. Use words like \"hurry\" and \"limited stock\"."),
        ("New product launch", "Launch a new product with excitement. Highlight what makes it unique and invite people to be the first to own it."),
        ("Event or live stream", "Promote an event or live stream with the date, time, place and what makes it worth attending."),
        ("Question", "Write the caption as an open question that invites followers to comment."),
        ("Q&A", "Invite followers to ask anything they want to know about the product or brand."),
        ("Behind the scenes", "Tell the story behind the work, production or origin of the product to build a connection with customers."),
        ("Testimonial", "Build the caption around a customer review to earn trust from real users."),
        ("Announcement", "Write a formal announcement suitable for important news such as policy changes or a new branch."),
        ("Casual chat", "Start a relaxed conversation that is not about selling. Ask a simple question about lifestyle or preferences."),
        ("Benefits first", "Focus on the benefits rather than the features: explain how the product solves a problem or improves the customer's life."),
        ("Team story", "Introduce a team member or share a challenge and success from the team to give the brand a human face."),
    ]
    .into_iter()
    .map(|(name, value)| PromptTemplate::new(name, value))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_prompt_contains_context_and_rules() {
        let prompt = caption_prompt("Red shirt, 299 THB", PostKind::Image, None);
        assert!(prompt.contains("Red shirt, 299 THB"));
        assert!(prompt.contains("single image"));
        assert!(prompt.contains("do not include any placeholder links"));
        assert!(!prompt.contains("Custom instructions"));
    }

    #[test]
    fn test_caption_prompt_carousel_and_custom() {
        let prompt = caption_prompt("data", PostKind::Carousel, Some("  Mention free shipping  "));
        assert!(prompt.contains("carousel"));
        assert!(prompt.contains("Custom instructions from the user:**\nMention free shipping\n"));
    }

    #[test]
    fn test_blank_custom_is_ignored() {
        let prompt = caption_prompt("data", PostKind::Video, Some("   "));
        assert!(prompt.contains("single video"));
        assert!(!prompt.contains("Custom instructions"));
    }

    #[test]
    fn test_image_prompt_wraps_subject() {
        let prompt = image_prompt(" a ceramic mug ");
        assert!(prompt.contains("Subject: \"a ceramic mug\""));
        assert!(prompt.contains("Avoid: text"));
    }

    #[test]
    fn test_default_templates_have_unique_names() {
        let templates = default_templates();
        assert_eq!(templates.len(), 15);
        let mut names: Vec<_> = templates.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 15);
    }
}
