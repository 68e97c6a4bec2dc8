//! Prompt templates
//!
//! French system prompts for the coach, plus helpers that render a contact's
//! profile and recent turns as model input.

use crate::contacts::{Contact, Profile, Role, Turn};

pub const COACH_INSTRUCTIONS: &str = "Tu es le coach FitMouv, un coach sportif et nutrition \
bienveillant qui accompagne ses clients sur WhatsApp. Réponds en français, de façon claire, \
concrète et motivante, en quelques phrases courtes adaptées à un message WhatsApp. Tutoie la \
personne. Appuie-toi sur son profil et sur l'historique de la conversation. Ne donne jamais de \
diagnostic médical : en cas de douleur ou de blessure, recommande de consulter un professionnel \
de santé.";

pub const PROGRAM_INSTRUCTIONS: &str = "Tu es le coach FitMouv. Rédige le premier programme \
personnalisé d'une personne qui vient de rejoindre l'accompagnement. Réponds en français, au \
format d'un message WhatsApp (pas de tableau, pas de titre Markdown). Propose une semaine type \
avec 3 à 4 séances réalistes et 3 conseils nutrition simples, en tenant compte de son objectif, \
de ses contraintes et de son niveau. Termine par une question qui l'invite à répondre.";

pub const SUMMARY_INSTRUCTIONS: &str = "Tu résumes une conversation entre le coach FitMouv et \
un client. Produis un résumé factuel en français de 10 lignes maximum : objectifs, contraintes, \
progrès, difficultés, engagements pris. Intègre le résumé précédent s'il existe. N'invente rien.";

/// Short notice for message types the bot cannot read.
pub const UNSUPPORTED_NOTICE: &str =
    "Je ne peux lire que les messages texte et les notes vocales pour le moment 🙏";

/// Sent when a voice note cannot be downloaded or transcribed.
pub const TRANSCRIPTION_APOLOGY: &str =
    "Désolé, je n'ai pas réussi à écouter ta note vocale 😕 Tu peux me l'écrire ?";

/// Reply used when generation fails.
pub const FALLBACK_REPLY: &str = "Désolé, je n’ai pas compris 😅";

/// Welcome text sent after a CRM signup.
pub fn welcome_text(first_name: &str) -> String {
    format!(
        "Bienvenue chez FitMouv {} ! 💪 Je suis ton coach sur WhatsApp. Je prépare ton programme \
personnalisé et je te l'envoie très vite. En attendant, dis-moi ce qui te motive le plus !",
        first_name
    )
}

fn profile_lines(profile: &Profile, whatsapp_name: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    let fields = [
        ("Prénom", profile.first_name.as_deref().or(whatsapp_name)),
        ("Nom", profile.last_name.as_deref()),
        ("Objectif", profile.goal.as_deref()),
        ("Contraintes", profile.constraints.as_deref()),
        ("Niveau", profile.level.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("- {}: {}", label, v.trim()));
        }
    }
    for (key, value) in &profile.extra {
        lines.push(format!("- {}: {}", key, value));
    }
    lines
}

fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.role {
                Role::User => "Client",
                Role::Assistant => "Coach",
            };
            format!("{}: {}", who, t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Input for a conversational reply: profile, summary, then the recent turns.
/// The last user turn is expected to be at the end of `contact.history`.
pub fn coach_input(contact: &Contact, recent_turns: usize) -> String {
    let mut out = String::new();

    let profile = profile_lines(&contact.profile, contact.whatsapp_name.as_deref());
    if !profile.is_empty() {
        out.push_str("Profil du client :\n");
        out.push_str(&profile.join("\n"));
        out.push_str("\n\n");
    }

    if let Some(summary) = contact.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        out.push_str("Résumé des échanges précédents :\n");
        out.push_str(summary.trim());
        out.push_str("\n\n");
    }

    let start = contact.history.len().saturating_sub(recent_turns);
    out.push_str("Conversation :\n");
    out.push_str(&render_turns(&contact.history[start..]));
    out.push_str("\nCoach:");
    out
}

pub fn program_input(contact: &Contact) -> String {
    let profile = profile_lines(&contact.profile, contact.whatsapp_name.as_deref());
    if profile.is_empty() {
        return "Profil du client : inconnu. Propose un programme débutant polyvalent.".to_string();
    }
    format!("Profil du client :\n{}", profile.join("\n"))
}

pub fn summary_input(previous: Option<&str>, turns: &[Turn]) -> String {
    let mut out = String::new();
    if let Some(prev) = previous.filter(|p| !p.trim().is_empty()) {
        out.push_str("Résumé précédent :\n");
        out.push_str(prev.trim());
        out.push_str("\n\n");
    }
    out.push_str("Nouveaux échanges :\n");
    out.push_str(&render_turns(turns));
    out
}
