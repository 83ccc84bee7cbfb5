//! Incremental merge of streamed message deltas into the transcript

use wren_chat::{Content, Message};

/// Fold an incoming message into the transcript.
///
/// A message sharing the last entry's id is a streaming continuation, not a
/// new entry: a lone text or thinking delta is concatenated onto the
/// matching trailing block (the token-by-token path), anything else is
/// appended to the entry's content list. Other messages start a new entry.
/// Content only ever grows here; wholesale replacement is the business of
/// `UpdateConversation` events.
pub fn merge_message(messages: &mut Vec<Message>, incoming: Message) {
    let Some(last) = messages.last_mut() else {
        messages.push(incoming);
        return;
    };
    if last.id != incoming.id {
        messages.push(incoming);
        return;
    }

    let mut content = incoming.content;
    if content.len() == 1 {
        let delta = content.swap_remove(0);
        match (last.content.pop(), delta) {
            (Some(Content::Text { text }), Content::Text { text: delta }) => {
                last.content.push(Content::Text { text: text + &delta });
            }
            (
                Some(Content::Thinking { thinking, signature }),
                Content::Thinking { thinking: delta, signature: incoming_signature },
            ) => {
                // The signature arrives on the final delta; keep the prior
                // one until a non-empty replacement shows up.
                let signature = match incoming_signature {
                    Some(sig) if !sig.is_empty() => Some(sig),
                    _ => signature,
                };
                last.content.push(Content::Thinking {
                    thinking: thinking + &delta,
                    signature,
                });
            }
            (previous, delta) => {
                if let Some(previous) = previous {
                    last.content.push(previous);
                }
                last.content.push(delta);
            }
        }
        return;
    }

    last.content.append(&mut content);
}
