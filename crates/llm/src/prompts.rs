//! Prompt text for the generator.

pub const OPTIMIZE_SYSTEM: &str = "You are a helpful assistant. Think through \
the code optimization strategies possible step by step.";

pub const OPTIMIZE_INSTRUCTIONS: &str = "\
Optimize the following C++ program so it consumes less energy at runtime. \
Lower energy usually follows from executing fewer instructions, touching \
less memory and finishing sooner, so aim for genuine algorithmic and \
data-layout improvements rather than cosmetic changes. The program must \
remain a single translation unit compiled with g++, and its output must \
stay exactly the same for the same input. Consider several distinct \
strategies, weigh their trade-offs, pick the most promising one and apply \
it to produce the complete optimized program.";

pub const FEEDBACK_PREFACE: &str = "\
An evaluator compared earlier variants of this program. Keep its \
suggestions in mind while optimizing:";

pub const REPAIR_SYSTEM: &str = "You are a code expert. Think through the \
code debugging strategies step by step.";

pub fn repair_prompt(broken: &str, diagnostics: &str) -> String {
    format!(
        "The following C++ program fails to compile.\n\n\
         ```cpp\n{}\n```\n\n\
         The compiler reported:\n\n```\n{}\n```\n\n\
         Fix the errors without changing what the program computes and \
         return the complete corrected program.",
        broken, diagnostics
    )
}
