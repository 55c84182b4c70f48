//! Prompt templates for the brain and worker agents.

pub const DEFAULT_BRAIN_PROMPT: &str = "You are a senior penetration tester directing an authorized assessment. \
You do not run tools yourself: a worker agent with shell access carries out each task you give it and \
reports back. Plan methodically (reconnaissance, enumeration, exploitation), give one concrete and \
actionable task at a time, and build on what earlier tasks revealed. When the goal is met, or nothing \
useful is left to try, answer with COMPLETE followed by a one-line summary.";

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You extract structured facts from penetration testing notes. \
Report only facts the notes state: open ports as integers, services as port/name pairs, vulnerabilities \
(CVE ids or short descriptions) and key findings worth remembering. For each fact add a reasoning step \
quoting the evidence. Leave a list empty when the notes say nothing about it.";

/// First message in the brain's thread.
pub fn brain_init(brain_prompt: &str, target: &str, goal: &str) -> String {
    format!(
        "{brain_prompt}\n\nTARGET INFORMATION:\n- Target: {target}\n- Goal: {goal}\n- Current Phase: RECONNAISSANCE\n\n\
         Your first task is to begin reconnaissance of the target. Start with basic port scanning."
    )
}

pub fn decision(context: &str, target: &str) -> String {
    format!(
        "Based on the current target state, decide the next action.\n\nCURRENT STATE:\n{context}\n\n\
         Provide a specific task for the worker to execute. Be direct and actionable.\n\
         Examples:\n\
         - \"Run nmap scan on {target}\"\n\
         - \"Check HTTP service on port 80 for vulnerabilities\"\n\
         - \"Try default credentials on admin panel\"\n\
         - \"COMPLETE: Successfully gained access to target\"\n\n\
         Your decision:"
    )
}

pub fn worker_task(task: &str) -> String {
    format!(
        "Execute this specific task: {task}\n\n\
         Use the appropriate tools to complete this task. Be thorough and report back with detailed results."
    )
}

pub fn notes(decision: &str, worker_result: &str) -> String {
    format!(
        "The worker finished the task you gave it.\n\nTASK:\n{decision}\n\nWORKER RESULT:\n{worker_result}\n\n\
         Write concise notes on what this result tells us about the target: open ports, services and \
         versions, vulnerabilities, credentials and anything else worth remembering. Only include facts \
         the result supports."
    )
}

pub fn report(target: &str, goal: &str, iterations: u32, state: &str, history: &str) -> String {
    format!(
        "Generate a penetration testing report based on this session:\n\n\
         TARGET: {target}\nGOAL: {goal}\nITERATIONS: {iterations}\nFINAL STATE:\n{state}\n\n\
         SESSION HISTORY:\n{history}\n\n\
         Create a professional penetration testing report with:\n\
         1. Executive Summary\n\
         2. Target Information\n\
         3. Methodology\n\
         4. Findings and Vulnerabilities\n\
         5. Recommendations\n\n\
         Report:"
    )
}
