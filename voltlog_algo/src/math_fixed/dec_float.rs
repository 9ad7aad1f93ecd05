// Licensed under the Apache License, Version 2.0

use super::fix64::Fix64;
use super::text;

/// Decimal floating point: a Q32.32 mantissa paired with a power-of-ten
/// exponent. The formatter uses it to keep user scale factors exact in
/// decimal while all arithmetic stays fixed-point.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecFloat {
    pub fix: Fix64,
    pub exp: i32,
}

impl DecFloat {
    pub const fn new(fix: Fix64, exp: i32) -> Self {
        DecFloat { fix, exp }
    }

    pub const fn from_int(int: i32) -> Self {
        DecFloat {
            fix: Fix64::from_int(int),
            exp: 0,
        }
    }

    /// Renders the value in scientific notation with `precision` digits
    /// after the decimal point, e.g. `1.2345e+01` for precision 4.
    /// Returns the length written.
    pub fn write_scientific(&self, buf: &mut [u8], precision: usize) -> usize {
        let mut n = 0;
        let bits = self.fix.to_bits();
        if bits < 0 {
            buf[n] = b'-';
            n += 1;
        }
        let mag = bits.unsigned_abs();

        if mag == 0 {
            buf[n] = b'0';
            buf[n + 1] = b'.';
            n += 2;
            for _ in 0..precision {
                buf[n] = b'0';
                n += 1;
            }
            buf[n] = b'e';
            buf[n + 1] = b'+';
            n += 2;
            n += text::write_uint_padded(&mut buf[n..], 0, 2);
            return n;
        }

        // Collect precision + 2 significant digits: one leading digit,
        // `precision` displayed fractional digits, one rounding guard.
        let want = precision + 2;
        let mut dig = [0u8; 24];
        let mut ndig = 0;
        let mut exp10: i32;
        let int = (mag >> 32) as u32;
        let mut frac = mag as u32;

        if int > 0 {
            let mut tmp = [0u8; 10];
            let mut t = 0;
            let mut v = int;
            while v > 0 {
                tmp[t] = (v % 10) as u8;
                v /= 10;
                t += 1;
            }
            exp10 = t as i32 - 1;
            let mut i = t;
            while i > 0 && ndig < want {
                i -= 1;
                dig[ndig] = tmp[i];
                ndig += 1;
            }
        } else {
            // Leading zeros of the fraction shift the exponent down.
            exp10 = -1;
            loop {
                let prod = (frac as u64) * 10;
                let d = (prod >> 32) as u8;
                frac = prod as u32;
                if d != 0 {
                    dig[0] = d;
                    ndig = 1;
                    break;
                }
                exp10 -= 1;
            }
        }
        while ndig < want {
            let prod = (frac as u64) * 10;
            dig[ndig] = (prod >> 32) as u8;
            frac = prod as u32;
            ndig += 1;
        }

        // Round on the guard digit, carrying into the leading digit if
        // the mantissa was all nines.
        if dig[want - 1] >= 5 {
            let mut i = want - 2;
            loop {
                if dig[i] < 9 {
                    dig[i] += 1;
                    break;
                }
                dig[i] = 0;
                if i == 0 {
                    dig[0] = 1;
                    exp10 += 1;
                    break;
                }
                i -= 1;
            }
        }

        buf[n] = b'0' + dig[0];
        buf[n + 1] = b'.';
        n += 2;
        for d in &dig[1..=precision] {
            buf[n] = b'0' + d;
            n += 1;
        }

        let e = exp10 + self.exp;
        buf[n] = b'e';
        buf[n + 1] = if e < 0 { b'-' } else { b'+' };
        n += 2;
        let ea = e.unsigned_abs() as u64;
        n += if ea < 100 {
            text::write_uint_padded(&mut buf[n..], ea, 2)
        } else {
            text::write_uint(&mut buf[n..], ea)
        };
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(v: DecFloat, precision: usize) -> std::string::String {
        let mut buf = [0u8; 32];
        let n = v.write_scientific(&mut buf, precision);
        std::string::String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn zero() {
        assert_eq!(render(DecFloat::default(), 4), "0.0000e+00");
    }

    #[test]
    fn integers() {
        assert_eq!(render(DecFloat::from_int(1), 4), "1.0000e+00");
        assert_eq!(render(DecFloat::from_int(32768), 4), "3.2768e+04");
        assert_eq!(render(DecFloat::from_int(-250), 2), "-2.50e+02");
    }

    #[test]
    fn decimal_exponent_applied() {
        let v = DecFloat::new(Fix64::from_int(32768), -6);
        assert_eq!(render(v, 4), "3.2768e-02");
        let v = DecFloat::new(Fix64::from_int(1000), -6);
        assert_eq!(render(v, 4), "1.0000e-03");
    }

    #[test]
    fn small_fractions() {
        let v = DecFloat::new(Fix64::from_millionths(1_234), 0);
        assert_eq!(render(v, 3), "1.234e-03");
        let v = DecFloat::new(Fix64::from_millionths(500_000), 0);
        assert_eq!(render(v, 2), "5.00e-01");
    }

    #[test]
    fn rounding_carry() {
        // 9.99999 rounds all the way into a new decade
        let v = DecFloat::new(Fix64::from_millionths(9_999_990), 0);
        assert_eq!(render(v, 4), "1.0000e+01");
        // plain round-up on the guard digit
        let v = DecFloat::new(Fix64::from_millionths(1_234_567), 0);
        assert_eq!(render(v, 4), "1.2346e+00");
    }

    #[test]
    fn truncated_integer_digits_round() {
        let v = DecFloat::from_int(123_456_789);
        assert_eq!(render(v, 4), "1.2346e+08");
    }
}
