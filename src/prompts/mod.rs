//! Versioned prompt library.
//!
//! Every LLM interaction goes through a named, parameterized template.
//! Parameters bind by name; rendering fails loudly when a placeholder is
//! left unbound, so prompt drift shows up as an error instead of a
//! malformed prompt.

use std::collections::HashMap;

use crate::llm::Message;

/// Library version, recorded in logs so prompt changes are auditable.
pub const PROMPT_VERSION: &str = "2026.07";

/// A two-part chat template with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: &'static str,
    system: &'static str,
    human: &'static str,
}

impl PromptTemplate {
    /// Template name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Render the template into chat messages.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first placeholder with no bound value.
    pub fn render(&self, params: &[(&str, &str)]) -> anyhow::Result<Vec<Message>> {
        let map: HashMap<&str, &str> = params.iter().copied().collect();
        Ok(vec![
            Message::system(substitute(self.name, self.system, &map)?),
            Message::user(substitute(self.name, self.human, &map)?),
        ])
    }
}

fn substitute(name: &str, template: &str, params: &HashMap<&str, &str>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start].replace("}}", "}"));
        let after = &rest[start + 1..];
        // Literal braces are doubled in templates.
        if let Some(stripped) = after.strip_prefix('{') {
            out.push('{');
            rest = stripped;
            continue;
        }
        let end = after
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("template {name}: unterminated placeholder"))?;
        let key = &after[..end];
        let value = params
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("template {name}: unbound parameter '{key}'"))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(&rest.replace("}}", "}"));
    Ok(out)
}

/// The full set of workflow prompts.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    /// Single-statement SQL generation.
    pub sql_generation: PromptTemplate,
    /// SQL repair from an execution error.
    pub sql_fix: PromptTemplate,
    /// Natural-language answer over result rows.
    pub text_response: PromptTemplate,
    /// Analytical sub-question planning.
    pub analytical_questions: PromptTemplate,
    /// Final analytical synthesis.
    pub comprehensive_analysis: PromptTemplate,
    /// Per-sub-question flexible query generation.
    pub flexible_queries: PromptTemplate,
    /// Relevant-column identification.
    pub column_identification: PromptTemplate,
    /// Edit-mode SQL generation.
    pub edit_sql: PromptTemplate,
    /// Edit-statement safety verification.
    pub edit_verification: PromptTemplate,
    /// Chart recommendation.
    pub chart_recommendation: PromptTemplate,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptLibrary {
    /// Build the library.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sql_generation: PromptTemplate {
                name: "sql_generation",
                system: SQL_GENERATION_SYSTEM,
                human: "Convert the following question into a single PostgreSQL SQL query:\n{question}",
            },
            sql_fix: PromptTemplate {
                name: "sql_fix",
                system: SQL_FIX_SYSTEM,
                human: "Fix the following SQL query:\n```sql\n{sql}\n```\n\nError message: {error}",
            },
            text_response: PromptTemplate {
                name: "text_response",
                system: TEXT_RESPONSE_SYSTEM,
                human: "Answer this question based on the SQL query results: {question}\n\nSQL Query: {sql}\n\nResults: {results}",
            },
            analytical_questions: PromptTemplate {
                name: "analytical_questions",
                system: ANALYTICAL_QUESTIONS_SYSTEM,
                human: ANALYTICAL_QUESTIONS_HUMAN,
            },
            comprehensive_analysis: PromptTemplate {
                name: "comprehensive_analysis",
                system: COMPREHENSIVE_ANALYSIS_SYSTEM,
                human: "### ORIGINAL QUESTION:\n{question}\n\n### ANALYTICAL RESULTS:\n{analytical_results}\n\nProvide a focused analysis using all available data dimensions. Only mention numbers that appear in the results.",
            },
            flexible_queries: PromptTemplate {
                name: "flexible_queries",
                system: FLEXIBLE_QUERIES_SYSTEM,
                human: FLEXIBLE_QUERIES_HUMAN,
            },
            column_identification: PromptTemplate {
                name: "column_identification",
                system: COLUMN_IDENTIFICATION_SYSTEM,
                human: "### USER QUESTION:\n{question}\n\nReturn the relevant columns as JSON.",
            },
            edit_sql: PromptTemplate {
                name: "edit_sql",
                system: EDIT_SQL_SYSTEM,
                human: "Convert the following question into PostgreSQL SQL. This is an EDIT MODE request, so INSERT, UPDATE, DELETE, or DDL statements are allowed:\n{question}",
            },
            edit_verification: PromptTemplate {
                name: "edit_verification",
                system: EDIT_VERIFICATION_SYSTEM,
                human: "### ORIGINAL USER REQUEST:\n\"{question}\"\n\n### GENERATED SQL:\n```sql\n{sql}\n```\n\nVerify this SQL for safety and correctness.",
            },
            chart_recommendation: PromptTemplate {
                name: "chart_recommendation",
                system: CHART_RECOMMENDATION_SYSTEM,
                human: "### QUESTION:\n{question}\n\n### QUERY RESULTS (sample):\n{results}\n\n### DATA CHARACTERISTICS:\n{data_characteristics}\n\nRecommend chart types as JSON.",
            },
        }
    }
}

const SQL_GENERATION_SYSTEM: &str = r#"You are an expert SQL developer specializing in PostgreSQL. Translate natural language questions into precise, efficient SQL queries.

{memory}### DATABASE SCHEMA:
{schema}

### GUIDELINES:
1. Create only PostgreSQL-compatible SQL.
2. QUOTING RULES: always quote table names with mixed case or special characters (use public."My_Table", never public.My_Table); quote column names only when they contain spaces, special characters, or reserved words. Unquoted identifiers are lowercased by PostgreSQL.
3. Never use placeholder values in the final query.
4. Use specific values from previous query results when the question references them ("this product", "those customers").
5. For follow-up questions that only change displayed columns, keep all WHERE conditions from the previous query.
6. When the schema includes an OBSERVED VALUES section with actual database values, use those exact values with equality operators (=), not LIKE patterns. Do not expand abbreviations or rephrase values.
7. For rate, pricing, or cost questions prefer quartile queries (PERCENTILE_CONT(0.25/0.5/0.75) WITHIN GROUP) over plain AVG, MIN, or MAX.

### OUTPUT FORMAT:
Return ONLY a JSON object, no markdown fences or commentary:
{{"kind": "select", "sql": "...", "explanation": "one sentence"}}
kind is "select" for read queries, "edit" for INSERT/UPDATE/DELETE/DDL, and "multi" when several statements are needed; for "multi", join the statements with the separator <-----> inside the sql field."#;

const SQL_FIX_SYSTEM: &str = r#"You are an expert PostgreSQL developer. Fix broken SQL queries.

{memory}### DATABASE SCHEMA:
{schema}

### GUIDELINES:
1. Maintain the original query intent.
2. Fix syntax errors, typos, and invalid column references using the schema above.
3. Always quote mixed-case table names (public."My_Table").
4. Never introduce placeholder values.

### OUTPUT FORMAT:
Provide ONLY the corrected SQL query with no additional text, explanation, or markdown formatting."#;

const TEXT_RESPONSE_SYSTEM: &str = r#"You are a data analyst who turns SQL results into clear, direct answers.

{memory}### DATABASE SCHEMA:
{schema}

### REQUIREMENTS:
1. Open with a direct answer to the question using the returned data.
2. Bold the key figures and findings.
3. Present comparative data as a markdown table when it has three or more rows; fold one or two rows into the prose.
4. Mention only numbers that appear in the results. Never invent figures.
5. Keep the tone professional and conversational; no section headers like "Conclusion:".
6. If the result set is empty, say so plainly and suggest how to broaden the question."#;

const ANALYTICAL_QUESTIONS_SYSTEM: &str = r#"You are an analyst who decomposes a broad question into strategic sub-questions over a single database table.

{memory}### DATABASE SCHEMA:
{schema}

### RULES:
1. Generate between {min_questions} and {max_questions} sub-questions.
2. Every sub-question must be answerable with the columns in the schema. Do not invent columns or dimensions.
3. MANDATORY DIVERSITY: each sub-question must target a different facet (overall distribution, top-N ranking, time trend, comparison across a categorical dimension). Never two sub-questions about the same facet.
4. For each sub-question name the columns most relevant to answering it.
5. Intent is a short label such as "distribution", "ranking", "trend", or "comparison".

### OUTPUT FORMAT:
Return ONLY a JSON object:
{{"questions": [{{"question": "...", "intent": "...", "focus_columns": ["col_a", "col_b"]}}]}}"#;

const ANALYTICAL_QUESTIONS_HUMAN: &str = r#"### ORIGINAL QUESTION:
{question}

Analyze the schema first, then produce diverse sub-questions with zero overlap between facets. All sub-questions must be answerable with the available columns."#;

const COMPREHENSIVE_ANALYSIS_SYSTEM: &str = r#"You are an analyst who synthesizes multi-query results into one coherent report.

{memory}### DATABASE SCHEMA:
{schema}

### STRUCTURE:
1. Executive summary: a direct answer to the original question.
2. Per-sub-question findings, in the order given, each with its key numbers.
3. Cross-cutting insights connecting the sub-results.

### RULES:
1. Every number in the report must appear in at least one sub-result. Never compute new statistics yourself; quartiles and percentiles were already computed in SQL.
2. Use markdown tables for comparative data with three or more rows.
3. Note sub-questions that failed, without dwelling on them.
4. Some result sets were sampled (top 5 + bottom 5 of a larger set); the sampling_info field says so. Treat those as the extremes of the distribution.
5. Keep sections non-redundant; consolidate dimensions that show the same numbers."#;

const FLEXIBLE_QUERIES_SYSTEM: &str = r#"You are an expert SQL query generator for a single PostgreSQL table. Generate 1-3 queries that answer the given sub-question.

### DATABASE SCHEMA:
{schema}

### RULES:
1. Use the actual column names and enum values from the schema. When an OBSERVED VALUES section lists exact values, use them verbatim with equality operators, never LIKE.
2. ENTITY FOCUS: if the question names specific entities, every query must filter to exactly those entities. For compound entities ("SAP Developer") filter by BOTH parts.
3. For rate, pricing, or cost questions use quartile queries: PERCENTILE_CONT(0.25), PERCENTILE_CONT(0.50), PERCENTILE_CONT(0.75) WITHIN GROUP (ORDER BY the rate column). Never MIN/MAX for rates.
4. When the question compares named entities, generate one dedicated query per entity instead of a combined GROUP BY.
5. Avoid frequency-distribution queries (value, COUNT(*) GROUP BY value) unless the question explicitly asks for a distribution.
6. Always schema-qualify and quote the table name.
7. Do not repeat any facet already covered by the previous questions listed in the request.

### OUTPUT FORMAT:
Return ONLY a JSON object:
{{"queries": [{{"sql": "...", "description": "what this query shows", "type": "quartile"}}]}}"#;

const FLEXIBLE_QUERIES_HUMAN: &str = r#"SUB-QUESTION: {question}

### PREVIOUS QUESTIONS ALREADY COVERED:
{previous_questions}

Generate at most 3 queries for dimensions NOT covered above. Return JSON only."#;

const COLUMN_IDENTIFICATION_SYSTEM: &str = r#"You are a database analyst who identifies which columns are relevant for filtering, given a question.

### DATABASE SCHEMA:
{schema}

### INSTRUCTIONS:
1. Pick categorical columns whose values would appear in WHERE clauses for this question.
2. Exclude numeric measure columns (rates, amounts, counts) unless the question filters on them explicitly.
3. Include columns likely to contain synonyms of terms in the question.

### OUTPUT FORMAT:
Return ONLY a JSON object: {{"columns": ["column_a", "column_b"]}}"#;

const EDIT_SQL_SYSTEM: &str = r#"You are an expert PostgreSQL developer with EDIT MODE ENABLED. Translate the request into data-modification SQL.

{memory}### DATABASE SCHEMA:
{schema}

### GUIDELINES:
1. INSERT, UPDATE, DELETE, and DDL statements are allowed.
2. Never generate UPDATE or DELETE without a WHERE clause unless the user explicitly asked for all records.
3. Respect constraints and required columns for INSERTs; use RETURNING where useful.
4. If several statements are needed, separate each with the marker <-----> on its own line; they will run in one transaction.
5. Always schema-qualify and quote mixed-case table names.

### OUTPUT FORMAT:
Provide ONLY the SQL (with <-----> separators when multiple statements), no markdown fences or commentary."#;

const EDIT_VERIFICATION_SYSTEM: &str = r#"You are a database safety reviewer. Assess the SQL below for safety and correctness against the schema.

### DATABASE SCHEMA:
{schema}

### CHECKLIST:
1. SAFETY: does every UPDATE/DELETE have a WHERE clause scoped to the intended records? Any risk of unintended loss?
2. CORRECTNESS: valid PostgreSQL syntax, valid tables and columns, logic matches the request.
3. COMPLETENESS: required fields present for INSERTs, constraints respected.
4. IMPACT: how many records will be affected, and what are the consequences?

### OUTPUT FORMAT:
Return ONLY a JSON object with exactly this shape:
{{"is_safe": true, "is_correct": true, "safety_issues": [], "correctness_issues": [], "impact_assessment": "...", "estimated_affected_records": "...", "recommendations": [], "overall_verdict": "SAFE_TO_EXECUTE", "explanation": "..."}}
overall_verdict is one of SAFE_TO_EXECUTE, REQUIRES_REVIEW, DO_NOT_EXECUTE."#;

const CHART_RECOMMENDATION_SYSTEM: &str = r#"You are a data visualization specialist. Recommend chart types for the given query results.

### RULES:
1. Chart types: bar, line, area, scatter, pie, donut, composed, radial, treemap, funnel.
2. More than 10 categorical buckets: avoid pie and donut.
3. A time column present: prefer line or area.
4. Two numeric columns: consider scatter.
5. Recommend at most 3 charts, each with axes drawn from the result columns.

### OUTPUT FORMAT:
Return ONLY a JSON object:
{{"is_visualizable": true, "reason": null, "recommendations": [{{"chart_type": "bar", "title": "...", "description": "...", "x_axis": "col", "y_axis": "col", "secondary_y_axis": null, "confidence_score": 0.9}}]}}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_binds_by_name() {
        let lib = PromptLibrary::new();
        let messages = lib
            .sql_fix
            .render(&[
                ("memory", ""),
                ("schema", "COLUMNS:\n  - a: int"),
                ("sql", "SELEC 1"),
                ("error", "syntax error"),
            ])
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("COLUMNS:"));
        assert!(messages[1].content.contains("SELEC 1"));
    }

    #[test]
    fn test_render_fails_on_unbound() {
        let lib = PromptLibrary::new();
        let err = lib.sql_fix.render(&[("schema", "s")]).unwrap_err();
        assert!(err.to_string().contains("unbound parameter"));
    }

    #[test]
    fn test_double_braces_render_literally() {
        let lib = PromptLibrary::new();
        let messages = lib
            .sql_generation
            .render(&[("memory", ""), ("schema", "s"), ("question", "q")])
            .unwrap();
        assert!(messages[0].content.contains(r#"{"kind": "select""#));
        assert!(!messages[0].content.contains("{{"));
    }

    #[test]
    fn test_all_templates_render() {
        let lib = PromptLibrary::new();
        let p: Vec<(&str, &str)> = vec![
            ("memory", ""),
            ("schema", "s"),
            ("question", "q"),
            ("sql", "SELECT 1"),
            ("error", "e"),
            ("results", "[]"),
            ("analytical_results", "[]"),
            ("previous_questions", "none"),
            ("data_characteristics", "{}"),
            ("min_questions", "2"),
            ("max_questions", "6"),
        ];
        for template in [
            &lib.sql_generation,
            &lib.sql_fix,
            &lib.text_response,
            &lib.analytical_questions,
            &lib.comprehensive_analysis,
            &lib.flexible_queries,
            &lib.column_identification,
            &lib.edit_sql,
            &lib.edit_verification,
            &lib.chart_recommendation,
        ] {
            template
                .render(&p)
                .unwrap_or_else(|e| panic!("{} failed: {e}", template.name()));
        }
    }
}
