//! Built-in hospital record kinds

use super::schema::{EntitySchema, FieldType};

use FieldType::{Boolean, Integer, Json, Real, Text};

pub fn standard_schemas() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("patient", "patients")
            .field("hospital_number", Text)
            .field("first_name", Text)
            .field("last_name", Text)
            .field("other_names", Text)
            .field("date_of_birth", Text)
            .field("gender", Text)
            .field("phone", Text)
            .field("email", Text)
            .field("address", Text)
            .field("national_id", Text)
            .field("blood_group", Text)
            .field("allergies", Json)
            .field("next_of_kin", Json)
            .field("is_active", Boolean),
        EntitySchema::new("encounter", "encounters")
            .field("patient_id", Text)
            .field("encounter_type", Text)
            .field("department_id", Text)
            .field("attending_doctor_id", Text)
            .field("status", Text)
            .field("chief_complaint", Text)
            .field("started_at", Integer)
            .field("ended_at", Integer),
        EntitySchema::new("vital_sign", "vitals")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("temperature", Real)
            .field("pulse", Integer)
            .field("respiratory_rate", Integer)
            .field("systolic_bp", Integer)
            .field("diastolic_bp", Integer)
            .field("oxygen_saturation", Real)
            .field("weight_kg", Real)
            .field("height_cm", Real)
            .field("recorded_by", Text)
            .field("recorded_at", Integer),
        EntitySchema::new("clinical_note", "clinical_notes")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("note_type", Text)
            .field("content", Text)
            .field("diagnosis_codes", Json)
            .field("author_id", Text),
        EntitySchema::new("prescription", "prescriptions")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("drug_id", Text)
            .field("drug_name", Text)
            .field("dose", Text)
            .field("frequency", Text)
            .field("route", Text)
            .field("duration_days", Integer)
            .field("quantity", Integer)
            .field("instructions", Text)
            .field("status", Text)
            .field("prescribed_by", Text),
        EntitySchema::new("lab_order", "lab_orders")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("test_code", Text)
            .field("test_name", Text)
            .field("priority", Text)
            .field("status", Text)
            .field("clinical_info", Text)
            .field("ordered_by", Text),
        EntitySchema::new("lab_result", "lab_results")
            .field("lab_order_id", Text)
            .field("patient_id", Text)
            .field("parameter", Text)
            .field("value", Text)
            .field("unit", Text)
            .field("reference_range", Text)
            .field("is_abnormal", Boolean)
            .field("verified_by", Text)
            .field("verified_at", Integer),
        EntitySchema::new("imaging_order", "imaging_orders")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("modality", Text)
            .field("body_part", Text)
            .field("priority", Text)
            .field("status", Text)
            .field("findings", Text)
            .field("ordered_by", Text),
        EntitySchema::new("admission", "admissions")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("ward_id", Text)
            .field("bed_id", Text)
            .field("admitting_doctor_id", Text)
            .field("admission_reason", Text)
            .field("status", Text)
            .field("admitted_at", Integer)
            .field("discharged_at", Integer),
        EntitySchema::new("invoice", "invoices")
            .field("patient_id", Text)
            .field("encounter_id", Text)
            .field("invoice_number", Text)
            .field("items", Json)
            .field("total_amount", Real)
            .field("amount_paid", Real)
            .field("balance", Real)
            .field("status", Text),
        EntitySchema::new("payment", "payments")
            .field("invoice_id", Text)
            .field("patient_id", Text)
            .field("amount", Real)
            .field("method", Text)
            .field("reference", Text)
            .field("received_by", Text)
            .field("paid_at", Integer),
        EntitySchema::new("antenatal_visit", "antenatal_visits")
            .field("patient_id", Text)
            .field("gestational_age_weeks", Integer)
            .field("fundal_height_cm", Real)
            .field("fetal_heart_rate", Integer)
            .field("blood_pressure", Text)
            .field("weight_kg", Real)
            .field("risk_factors", Json)
            .field("next_visit_date", Text),
        EntitySchema::new("postnatal_visit", "postnatal_visits")
            .field("patient_id", Text)
            .field("days_postpartum", Integer)
            .field("mother_condition", Text)
            .field("baby_condition", Text)
            .field("breastfeeding", Boolean)
            .field("notes", Text),
        EntitySchema::new("immunization", "immunization_schedules")
            .field("patient_id", Text)
            .field("vaccine", Text)
            .field("dose_number", Integer)
            .field("due_date", Text)
            .field("administered_at", Integer)
            .field("batch_number", Text)
            .field("status", Text),
    ]
}
