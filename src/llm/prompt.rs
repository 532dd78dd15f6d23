//! Clinical analysis prompt assembly.
//!
//! A prompt is composed from fixed fragments in a fixed order:
//!
//! 1. base role and mission ([`BASE_ROLE_PROMPT`])
//! 2. specialty clinical focus (falls back to general medicine)
//! 3. session-type focus, or the chunk-position block in chunked mode
//! 4. knowledge-base injection, or a placeholder notice
//! 5. the transcription wrapped in delimiters
//! 6. the output contract ([`OUTPUT_FORMAT_CONTRACT`])
//!
//! Assembly never fails: every enum has a documented default and the
//! transcription is embedded verbatim.

use crate::models::{ChunkPosition, KnowledgeBase, PromptRequest, SessionType, Specialty};
use crate::security::PromptAuditEntry;

/// Base role and mission instructions.
pub const BASE_ROLE_PROMPT: &str = r"<rol>
Eres un asistente clínico experto que apoya a profesionales de la salud durante y después de la consulta. Analizas transcripciones de sesiones clínicas para detectar riesgos, omisiones y oportunidades de mejora en la documentación SOAP.
</rol>

<mision>
1. Identificar banderas rojas y hallazgos que requieran atención inmediata.
2. Sugerir preguntas, exploraciones, pruebas o intervenciones pertinentes.
3. Evaluar la completitud de cada sección SOAP (Subjetivo, Objetivo, Evaluación, Plan).
4. Valorar la calidad de la sesión clínica y proponer áreas de mejora.

Nunca inventes datos que no estén en la transcripción. Cita la evidencia textual que respalda cada advertencia. Ante la duda, prioriza la seguridad del paciente.
</mision>";

/// Delimiter that opens the transcription block.
pub const TRANSCRIPTION_OPEN: &str = "<transcripcion>";

/// Delimiter that closes the transcription block.
pub const TRANSCRIPTION_CLOSE: &str = "</transcripcion>";

/// Marker the model must prefix degraded-confidence findings with in chunked mode.
pub const PARTIAL_ANALYSIS_MARKER: &str = "[ANÁLISIS PARCIAL]";

/// Placeholder emitted when no knowledge base was supplied.
pub const KNOWLEDGE_BASE_PLACEHOLDER: &str = "<base_conocimiento>
No se proporcionó una base de conocimiento específica. Utiliza guías clínicas generales basadas en evidencia.
</base_conocimiento>";

/// Fixed output contract. The model must answer with exactly this JSON shape.
pub const OUTPUT_FORMAT_CONTRACT: &str = r#"<formato_respuesta>
Responde ÚNICAMENTE con un objeto JSON válido con exactamente esta estructura:
{
  "warnings": [
    {
      "id": "string",
      "severity": "HIGH" | "MEDIUM" | "LOW",
      "category": "string",
      "title": "string",
      "description": "string",
      "recommendation": "string",
      "evidence": ["cita textual de la transcripción"]
    }
  ],
  "suggestions": [
    {
      "id": "string",
      "type": "question" | "examination" | "test" | "treatment" | "referral" | "documentation",
      "title": "string",
      "description": "string",
      "rationale": "string",
      "priority": "HIGH" | "MEDIUM" | "LOW"
    }
  ],
  "soapAnalysis": {
    "completenessScores": { "subjective": 0-100, "objective": 0-100, "assessment": 0-100, "plan": 0-100 },
    "missingElements": ["string"]
  },
  "sessionQuality": {
    "scores": { "communication": 0-100, "clinicalReasoning": 0-100, "documentation": 0-100 },
    "areasForImprovement": ["string"]
  }
}

Reglas estrictas:
- No incluyas texto antes ni después del JSON.
- No envuelvas el JSON en bloques de código markdown.
- Usa listas vacías [] en lugar de null.
- Todas las puntuaciones son números entre 0 y 100.
</formato_respuesta>"#;

const GENERAL_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Medicina General.
- Motivo de consulta, historia de la enfermedad actual y antecedentes relevantes.
- Signos vitales y exploración física dirigida.
- Diagnóstico diferencial razonado y criterios de derivación.
- Adherencia terapéutica, interacciones y alergias medicamentosas.
</enfoque_especialidad>";

const PHYSIOTHERAPY_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Fisioterapia.
- Mecanismo de lesión, evolución del dolor (escala EVA) y limitación funcional.
- Rango de movimiento, fuerza muscular y pruebas ortopédicas específicas.
- Banderas rojas que contraindican la terapia manual o el ejercicio.
- Objetivos funcionales medibles y plan de ejercicio domiciliario.
</enfoque_especialidad>";

const PSYCHOLOGY_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Psicología / Salud Mental.
- Estado de ánimo, afecto, pensamiento y riesgo suicida o de autolesión.
- Consumo de sustancias, red de apoyo y factores de estrés actuales.
- Alianza terapéutica y técnicas de intervención utilizadas.
- Criterios de derivación a psiquiatría o a servicios de crisis.
</enfoque_especialidad>";

const CARDIOLOGY_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Cardiología.
- Caracterización del dolor torácico, disnea, palpitaciones y síncope.
- Factores de riesgo cardiovascular y tratamiento antitrombótico.
- Hallazgos de ECG, presión arterial y signos de insuficiencia cardiaca.
- Criterios de síndrome coronario agudo y necesidad de atención urgente.
</enfoque_especialidad>";

const NEUROLOGY_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Neurología.
- Inicio, temporalidad y progresión de los síntomas neurológicos.
- Déficits focales, alteraciones del habla, la marcha o la conciencia.
- Cefalea con signos de alarma y crisis convulsivas.
- Ventana terapéutica en sospecha de ictus.
</enfoque_especialidad>";

const PEDIATRICS_FOCUS: &str = "<enfoque_especialidad>
Especialidad: Pediatría.
- Edad, peso y dosificación de fármacos ajustada.
- Hitos del desarrollo y calendario de vacunación.
- Signos de deshidratación, dificultad respiratoria o sepsis.
- Información y consentimiento de padres o tutores.
</enfoque_especialidad>";

const INITIAL_SESSION_FOCUS: &str = "<tipo_sesion>
Sesión inicial: verifica que se documenten anamnesis completa, antecedentes personales y familiares, alergias, medicación actual, exploración basal y un plan inicial con objetivos.
</tipo_sesion>";

const FOLLOWUP_SESSION_FOCUS: &str = "<tipo_sesion>
Sesión de seguimiento: verifica la evolución respecto a la sesión previa, la respuesta al tratamiento, efectos adversos, adherencia y los ajustes del plan.
</tipo_sesion>";

const WHOLE_TRANSCRIPTION_BLOCK: &str = "<alcance_analisis>
La transcripción está completa. Realiza un análisis integral de toda la sesión.
</alcance_analisis>";

/// Returns the clinical focus block for a specialty.
#[must_use]
pub const fn specialty_focus(specialty: Specialty) -> &'static str {
    match specialty {
        Specialty::General => GENERAL_FOCUS,
        Specialty::Physiotherapy => PHYSIOTHERAPY_FOCUS,
        Specialty::Psychology => PSYCHOLOGY_FOCUS,
        Specialty::Cardiology => CARDIOLOGY_FOCUS,
        Specialty::Neurology => NEUROLOGY_FOCUS,
        Specialty::Pediatrics => PEDIATRICS_FOCUS,
    }
}

/// Returns the focus block for a session type.
#[must_use]
pub const fn session_focus(session_type: SessionType) -> &'static str {
    match session_type {
        SessionType::Initial => INITIAL_SESSION_FOCUS,
        SessionType::Followup => FOLLOWUP_SESSION_FOCUS,
    }
}

/// Builds the chunk-position block.
#[must_use]
pub fn chunk_block(chunk: ChunkPosition) -> String {
    if !chunk.is_partial() {
        return WHOLE_TRANSCRIPTION_BLOCK.to_string();
    }

    format!(
        "<alcance_analisis>
Estás analizando el FRAGMENTO {index} de {total} de una transcripción más larga.
- Analiza SOLO el contenido de este fragmento.
- No asumas información que no aparece en él; otros fragmentos se analizan por separado.
- Prefija con \"{PARTIAL_ANALYSIS_MARKER}\" el título de cualquier hallazgo cuya confianza se vea reducida por el contexto incompleto.
</alcance_analisis>",
        index = chunk.index,
        total = chunk.total,
    )
}

/// Builds the knowledge-base block for a specialty.
#[must_use]
pub fn knowledge_base_block(knowledge_base: Option<&KnowledgeBase>, specialty: Specialty) -> String {
    let Some(kb) = knowledge_base else {
        return KNOWLEDGE_BASE_PLACEHOLDER.to_string();
    };

    let rules = kb.rules_for(specialty);
    let terms = kb.terminology_for(specialty);

    let mut block = String::from("<base_conocimiento>\n");
    if rules.is_empty() && terms.is_empty() {
        block.push_str(&format!(
            "La base de conocimiento no contiene entradas para {}. Utiliza guías clínicas generales basadas en evidencia.\n",
            specialty.label()
        ));
    }
    if !rules.is_empty() {
        block.push_str("Reglas clínicas a aplicar:\n");
        for rule in rules {
            block.push_str("- ");
            block.push_str(rule);
            block.push('\n');
        }
    }
    if !terms.is_empty() {
        block.push_str("Terminología de referencia:\n");
        for term in terms {
            block.push_str(&format!("- {}: {}\n", term.term, term.definition));
        }
    }
    block.push_str("</base_conocimiento>");
    block
}

/// Assembles clinical analysis prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler {
    audit: bool,
}

impl PromptAssembler {
    /// Creates an assembler with auditing disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { audit: false }
    }

    /// Enables or disables the prompt audit entry.
    #[must_use]
    pub const fn with_audit(mut self, enabled: bool) -> Self {
        self.audit = enabled;
        self
    }

    /// Builds the complete prompt for a request.
    #[must_use]
    pub fn build_prompt(&self, request: &PromptRequest<'_>) -> String {
        let context_block = match request.chunk {
            Some(chunk) => chunk_block(chunk),
            None => session_focus(request.session_type).to_string(),
        };

        let sections = [
            BASE_ROLE_PROMPT.to_string(),
            specialty_focus(request.specialty).to_string(),
            context_block,
            knowledge_base_block(request.knowledge_base, request.specialty),
            format!(
                "{TRANSCRIPTION_OPEN}\n{}\n{TRANSCRIPTION_CLOSE}",
                request.transcription
            ),
            OUTPUT_FORMAT_CONTRACT.to_string(),
        ];
        let prompt = sections.join("\n\n");

        tracing::debug!(
            prompt_length = prompt.len(),
            specialty = %request.specialty,
            session_type = %request.session_type,
            chunked = request.chunk.is_some_and(|c| c.is_partial()),
            "Assembled clinical prompt"
        );

        if self.audit {
            PromptAuditEntry::from_request(request, &prompt).record();
        }

        prompt
    }
}
